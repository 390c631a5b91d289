//! Document admin panel.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`  | `/` | Basic | Dashboard |
//! | `POST` | `/upload` | Basic | Multipart upload, field `files` (repeatable) |
//! | `POST` | `/delete/{id}` | Basic | Delete one document |
//! | `POST` | `/reindex` | Basic | Request an index rebuild |
//! | `GET`  | `/logout` | none | 401 challenge so the browser forgets credentials |
//! | `GET`  | `/health` | none | `{"status":"ok","service":"admin-panel"}` |
//!
//! Actions answer with `303 See Other` to `/?message=…&type=…`, which the
//! dashboard renders as a flash message.

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::admin_page::{render_dashboard, Dashboard, Flash, FlashKind};
use crate::auth::{parse_basic_auth, unauthorized, AdminUser, CredentialVerifier, StaticCredentials};
use crate::config::Config;
use crate::error::AppError;
use crate::reindex::ReindexSignal;
use crate::store::{DeleteOutcome, DocumentStore, UploadReport, UploadedFile};

/// Request bodies above this size are rejected before the handler runs.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct AdminState {
    pub store: DocumentStore,
    pub signal: ReindexSignal,
    pub credentials: Arc<dyn CredentialVerifier>,
    /// Base URL of the API service to notify after a reindex request.
    pub api_url: Option<String>,
    pub http: reqwest::Client,
}

impl AdminState {
    pub fn new(
        store: DocumentStore,
        signal: ReindexSignal,
        credentials: Arc<dyn CredentialVerifier>,
        api_url: Option<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .unwrap_or_default();
        Self {
            store,
            signal,
            credentials,
            api_url: api_url.map(|u| u.trim_end_matches('/').to_string()),
            http,
        }
    }
}

pub async fn run_admin_server(config: &Config) -> Result<()> {
    let store = DocumentStore::open(&config.paths.database, &config.paths.documents_dir).await?;
    let state = AdminState::new(
        store,
        ReindexSignal::new(&config.paths.sentinel),
        Arc::new(StaticCredentials::from_env_or_config(&config.admin)),
        config.admin.api_url.clone(),
    );

    let app = admin_router(state);
    let listener = tokio::net::TcpListener::bind(&config.admin.bind).await?;
    tracing::info!(
        bind = %config.admin.bind,
        documents = %config.paths.documents_dir.display(),
        "admin panel listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn admin_router(state: AdminState) -> Router {
    let protected = Router::new()
        .route("/", get(handle_dashboard))
        .route("/upload", post(handle_upload))
        .route("/delete/{id}", post(handle_delete))
        .route("/reindex", post(handle_reindex))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(protected)
        .route("/logout", get(handle_logout))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_auth(State(state): State<AdminState>, mut request: Request, next: Next) -> Response {
    let Some((username, password)) = parse_basic_auth(request.headers()) else {
        return unauthorized("Authentication required");
    };
    if !state.credentials.verify(&username, &password) {
        tracing::warn!(username = %username, "admin login rejected");
        return unauthorized("Invalid credentials");
    }
    request.extensions_mut().insert(AdminUser(username));
    next.run(request).await
}

/// `303 See Other` to the dashboard with a flash message.
fn flash_redirect(message: &str, kind: FlashKind) -> Redirect {
    Redirect::to(&format!(
        "/?message={}&type={}",
        urlencoding::encode(message),
        kind.as_str()
    ))
}

#[derive(Debug, Deserialize)]
struct DashboardQuery {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

async fn handle_dashboard(
    State(state): State<AdminState>,
    Extension(AdminUser(username)): Extension<AdminUser>,
    Query(query): Query<DashboardQuery>,
) -> Result<Html<String>, AppError> {
    let documents = state.store.list().await?;
    let stats = state.store.stats().await?;
    let history = state.store.history(5).await?;

    let flash = query.message.filter(|m| !m.is_empty()).map(|message| Flash {
        message,
        kind: FlashKind::parse(query.kind.as_deref().unwrap_or("info")),
    });

    Ok(Html(render_dashboard(&Dashboard {
        username: &username,
        stats,
        documents: &documents,
        history: &history,
        reindex_pending: state.signal.is_pending(),
        flash,
    })))
}

async fn handle_upload(
    State(state): State<AdminState>,
    Extension(AdminUser(username)): Extension<AdminUser>,
    mut multipart: Multipart,
) -> Redirect {
    let mut files = Vec::new();
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("files") {
                    continue;
                }
                let name = match field.file_name() {
                    Some(n) if !n.is_empty() => n.to_string(),
                    // Browsers send an empty part when nothing was picked
                    _ => continue,
                };
                match field.bytes().await {
                    Ok(bytes) => files.push(UploadedFile {
                        name,
                        bytes: bytes.to_vec(),
                    }),
                    Err(e) => {
                        tracing::error!(file = %name, error = %e, "failed to read upload");
                        return flash_redirect(
                            &format!("Upload failed while reading {}: {}", name, e),
                            FlashKind::Danger,
                        );
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read multipart body");
                return flash_redirect(&format!("Upload failed: {}", e), FlashKind::Danger);
            }
        }
    }

    let received = files.len();
    let report = state.store.upload_batch(files).await;
    tracing::info!(
        user = %username,
        received,
        uploaded = report.uploaded.len(),
        rejected = report.errors.len(),
        "upload processed"
    );

    let (message, kind) = upload_message(&report);
    flash_redirect(&message, kind)
}

/// Flash text and severity for an upload outcome.
pub fn upload_message(report: &UploadReport) -> (String, FlashKind) {
    let uploaded = report.uploaded.len();
    match (uploaded, report.errors.is_empty()) {
        (0, true) => ("Error: no files selected".to_string(), FlashKind::Danger),
        (0, false) => (
            format!("Error: {}", report.errors.join(", ")),
            FlashKind::Danger,
        ),
        (n, true) => (
            format!("{} document(s) uploaded. Run a reindex to make them searchable.", n),
            FlashKind::Success,
        ),
        (n, false) => (
            format!(
                "{} uploaded, {} error(s): {}",
                n,
                report.errors.len(),
                report.errors.join(", ")
            ),
            FlashKind::Warning,
        ),
    }
}

async fn handle_delete(
    State(state): State<AdminState>,
    Extension(AdminUser(username)): Extension<AdminUser>,
    Path(id): Path<i64>,
) -> Redirect {
    match state.store.delete(id).await {
        Ok(DeleteOutcome::Deleted(record)) => {
            tracing::info!(user = %username, id, filename = %record.filename, "document deleted by admin");
            flash_redirect(
                &format!(
                    "Deleted {}. Run a reindex to update the index.",
                    record.original_name
                ),
                FlashKind::Success,
            )
        }
        Ok(DeleteOutcome::NotFound) => flash_redirect("Document not found", FlashKind::Danger),
        Err(e) => {
            tracing::error!(id, error = %format!("{:#}", e), "delete failed");
            flash_redirect(&format!("Error: {:#}", e), FlashKind::Danger)
        }
    }
}

async fn handle_reindex(
    State(state): State<AdminState>,
    Extension(AdminUser(username)): Extension<AdminUser>,
) -> Redirect {
    let requested = async {
        state.signal.request("admin")?;
        state.store.request_reindex().await
    }
    .await;

    match requested {
        Ok(count) => {
            tracing::info!(user = %username, documents = count, "reindex requested");
            let notified = notify_api(&state);
            let message = if notified {
                "Reindex requested. The API service is rebuilding the index now."
            } else {
                "Reindex requested. It will be applied the next time the API service starts or reloads."
            };
            flash_redirect(message, FlashKind::Success)
        }
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "reindex request failed");
            flash_redirect(&format!("Error: {:#}", e), FlashKind::Danger)
        }
    }
}

/// Fires `POST {api_url}/reload` in the background. Returns whether a
/// notification was sent.
fn notify_api(state: &AdminState) -> bool {
    let Some(api_url) = state.api_url.clone() else {
        return false;
    };
    let client = state.http.clone();
    tokio::spawn(async move {
        let url = format!("{}/reload", api_url);
        match client.post(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(url = %url, "API service reloaded");
            }
            Ok(resp) => {
                tracing::warn!(url = %url, status = %resp.status(), "API reload returned an error");
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "API reload notification failed");
            }
        }
    });
    true
}

async fn handle_logout() -> Response {
    unauthorized("Logged out")
}

async fn handle_health() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CACHE_CONTROL, "no-store")],
        Json(serde_json::json!({ "status": "ok", "service": "admin-panel" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentRecord;

    fn record(name: &str) -> DocumentRecord {
        DocumentRecord {
            id: 1,
            filename: name.to_string(),
            original_name: name.to_string(),
            file_size: 1,
            file_type: ".txt".to_string(),
            uploaded_at: 0,
            indexed: false,
        }
    }

    #[test]
    fn upload_message_rules() {
        let all_ok = UploadReport {
            uploaded: vec![record("a.txt"), record("b.txt")],
            errors: vec![],
        };
        assert_eq!(upload_message(&all_ok).1, FlashKind::Success);
        assert!(upload_message(&all_ok).0.starts_with("2 document(s) uploaded"));

        let mixed = UploadReport {
            uploaded: vec![record("a.txt")],
            errors: vec!["x.exe: unsupported format".to_string()],
        };
        let (text, kind) = upload_message(&mixed);
        assert_eq!(kind, FlashKind::Warning);
        assert!(text.contains("x.exe: unsupported format"));

        let none = UploadReport {
            uploaded: vec![],
            errors: vec!["x.exe: unsupported format".to_string()],
        };
        assert_eq!(upload_message(&none).1, FlashKind::Danger);

        let empty = UploadReport::default();
        assert_eq!(
            upload_message(&empty),
            ("Error: no files selected".to_string(), FlashKind::Danger)
        );
    }
}
