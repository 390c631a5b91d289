//! Admin panel driven through its router: authentication, uploads,
//! deletes and reindex requests against a temporary store.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{basic_auth, multipart_body};
use docrag::admin_server::{admin_router, AdminState};
use docrag::auth::StaticCredentials;
use docrag::config::Config;
use docrag::reindex::ReindexSignal;
use docrag::store::{DocumentStore, ACTION_REINDEX_REQUESTED};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "docrag-test-boundary";

struct Harness {
    _tmp: TempDir,
    config: Config,
    store: DocumentStore,
    router: Router,
}

async fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let config = Config::rooted_at(tmp.path());
    let store = DocumentStore::open(&config.paths.database, &config.paths.documents_dir)
        .await
        .unwrap();
    let state = AdminState::new(
        store.clone(),
        ReindexSignal::new(&config.paths.sentinel),
        Arc::new(StaticCredentials::new("admin", "s3cret")),
        None,
    );
    Harness {
        _tmp: tmp,
        config,
        store,
        router: admin_router(state),
    }
}

fn authed(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, basic_auth("admin", "s3cret"))
}

async fn upload(router: &Router, files: &[(&str, &[u8])]) -> axum::response::Response {
    let request = authed("POST", "/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(BOUNDARY, files)))
        .unwrap();
    router.clone().oneshot(request).await.unwrap()
}

fn location(response: &axum::response::Response) -> String {
    response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn dashboard_requires_credentials() {
    let h = harness().await;

    let anonymous = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = h.router.clone().oneshot(anonymous).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    let wrong = Request::builder()
        .uri("/")
        .header(header::AUTHORIZATION, basic_auth("admin", "nope"))
        .body(Body::empty())
        .unwrap();
    let response = h.router.clone().oneshot(wrong).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .router
        .clone()
        .oneshot(authed("GET", "/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Signed in as <strong>admin</strong>"));
    assert!(html.contains("No documents uploaded yet."));
}

#[tokio::test]
async fn health_and_logout_are_public() {
    let h = harness().await;

    let response = h
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "admin-panel");

    let response = h
        .router
        .clone()
        .oneshot(Request::builder().uri("/logout").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[header::WWW_AUTHENTICATE],
        "Basic realm=\"docrag admin\""
    );
}

#[tokio::test]
async fn upload_stores_supported_files_and_reports_the_rest() {
    let h = harness().await;

    let response = upload(
        &h.router,
        &[
            ("notes.md", "# Notes\n\nSome text.".as_bytes()),
            ("virus.exe", "MZ".as_bytes()),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let loc = location(&response);
    assert!(loc.starts_with("/?message="));
    assert!(loc.ends_with("&type=warning"));
    assert!(loc.contains("virus.exe"));

    let docs = h.store.list().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].original_name, "notes.md");
    assert_eq!(docs[0].file_type, ".md");
    assert!(!docs[0].indexed);
    assert!(h.config.paths.documents_dir.join("notes.md").exists());
    assert!(!h.config.paths.documents_dir.join("virus.exe").exists());
}

#[tokio::test]
async fn same_name_uploads_get_distinct_files() {
    let h = harness().await;

    let first = upload(&h.router, &[("report.txt", "first".as_bytes())]).await;
    assert!(location(&first).ends_with("&type=success"));
    let second = upload(&h.router, &[("report.txt", "second".as_bytes())]).await;
    assert!(location(&second).ends_with("&type=success"));

    let docs = h.store.list().await.unwrap();
    assert_eq!(docs.len(), 2);
    assert_ne!(docs[0].filename, docs[1].filename);
    assert!(docs.iter().all(|d| d.original_name == "report.txt"));
    for doc in &docs {
        assert!(h.config.paths.documents_dir.join(&doc.filename).exists());
    }
}

#[tokio::test]
async fn only_rejected_files_is_danger() {
    let h = harness().await;
    let response = upload(&h.router, &[("archive.zip", "PK".as_bytes())]).await;
    assert!(location(&response).ends_with("&type=danger"));
    assert!(h.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_removes_file_and_record() {
    let h = harness().await;
    upload(&h.router, &[("gone.txt", "bye".as_bytes())]).await;
    let id = h.store.list().await.unwrap()[0].id;

    let response = h
        .router
        .clone()
        .oneshot(
            authed("POST", &format!("/delete/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).ends_with("&type=success"));
    assert!(h.store.list().await.unwrap().is_empty());
    assert!(!h.config.paths.documents_dir.join("gone.txt").exists());

    let again = h
        .router
        .clone()
        .oneshot(
            authed("POST", &format!("/delete/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let loc = location(&again);
    assert!(loc.contains("Document%20not%20found"));
    assert!(loc.ends_with("&type=danger"));
}

#[tokio::test]
async fn reindex_writes_sentinel_and_resets_flags() {
    let h = harness().await;
    upload(&h.router, &[("a.txt", "alpha".as_bytes()), ("b.md", "beta".as_bytes())]).await;
    h.store
        .mark_indexed(&["a.txt".to_string(), "b.md".to_string()])
        .await
        .unwrap();

    let response = h
        .router
        .clone()
        .oneshot(authed("POST", "/reindex").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).ends_with("&type=success"));

    assert!(h.config.paths.sentinel.exists());
    let token: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&h.config.paths.sentinel).unwrap()).unwrap();
    assert_eq!(token["requested_by"], "admin");

    let stats = h.store.stats().await.unwrap();
    assert_eq!(stats.indexed_docs, 0);
    let history = h.store.history(5).await.unwrap();
    assert_eq!(history[0].action, ACTION_REINDEX_REQUESTED);
    assert_eq!(history[0].documents_count, 2);

    // The dashboard shows the pending request
    let html = body_text(
        h.router
            .clone()
            .oneshot(authed("GET", "/").body(Body::empty()).unwrap())
            .await
            .unwrap(),
    )
    .await;
    assert!(html.contains("Reindex pending"));
}

#[tokio::test]
async fn flash_message_is_rendered_escaped() {
    let h = harness().await;
    let response = h
        .router
        .clone()
        .oneshot(
            authed("GET", "/?message=%3Cscript%3Ehi%3C%2Fscript%3E&type=warning")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let html = body_text(response).await;
    assert!(html.contains("flash-warning"));
    assert!(html.contains("&lt;script&gt;hi&lt;/script&gt;"));
    assert!(!html.contains("<script>hi"));
}
