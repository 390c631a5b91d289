//! OpenAI-compatible RAG API server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service banner with `rag_enabled` |
//! | `GET`  | `/health` | Readiness detail |
//! | `GET`  | `/v1/models`, `/api/models` | RAG model id plus the underlying LLM |
//! | `POST` | `/v1/chat/completions`, `/api/chat/completions` | Non-streaming chat completion |
//! | `POST` | `/v1/embeddings` | Placeholder, always an empty list |
//! | `GET`  | `/documents` | Files in the documents directory and index size |
//! | `POST` | `/reload` | Request a rebuild and run setup now |
//!
//! Errors use the envelope from [`crate::error`]. CORS is fully open.

use anyhow::Result;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{bad_request, internal, not_configured, AppError};
use crate::models::{supported_extension, SUPPORTED_EXTENSIONS};
use crate::openai::{ChatCompletionRequest, ChatCompletionResponse, ModelsResponse};
use crate::rag::{ChatError, HostedProviders, RagService, SetupError};
use crate::stats::format_size_readable;
use crate::store::DocumentStore;

const SERVICE_NAME: &str = "RAG API Server";

#[derive(Clone)]
struct ApiState {
    service: Arc<RagService>,
}

/// Opens the store, runs the setup sequence and serves until terminated.
/// A failed setup is logged; the server still starts.
pub async fn run_api_server(config: &Config) -> Result<()> {
    let store = DocumentStore::open(&config.paths.database, &config.paths.documents_dir).await?;
    let service = Arc::new(RagService::new(
        config.clone(),
        store,
        Arc::new(HostedProviders),
    ));
    service.start().await;

    let app = api_router(service);
    let listener = tokio::net::TcpListener::bind(&config.api.bind).await?;
    tracing::info!(bind = %config.api.bind, "API server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn api_router(service: Arc<RagService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/v1/models", get(handle_models))
        .route("/api/models", get(handle_models))
        .route("/v1/chat/completions", post(handle_chat))
        .route("/api/chat/completions", post(handle_chat))
        .route("/v1/embeddings", post(handle_embeddings))
        .route("/documents", get(handle_documents))
        .route("/reload", post(handle_reload))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState { service })
}

#[derive(Serialize)]
struct RootResponse {
    status: &'static str,
    service: &'static str,
    model: String,
    rag_enabled: bool,
}

async fn handle_root(State(state): State<ApiState>) -> Json<RootResponse> {
    let context = state.service.snapshot().await;
    Json(RootResponse {
        status: "ok",
        service: SERVICE_NAME,
        model: state.service.config().llm.model.clone(),
        rag_enabled: context.query_engine_ready(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    rag_enabled: bool,
    documents_path: String,
    index_loaded: bool,
    model: String,
}

async fn handle_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let context = state.service.snapshot().await;
    let config = state.service.config();
    Json(HealthResponse {
        status: "healthy",
        rag_enabled: context.query_engine_ready(),
        documents_path: config.paths.documents_dir.display().to_string(),
        index_loaded: context.index_loaded(),
        model: config.llm.model.clone(),
    })
}

async fn handle_models(State(state): State<ApiState>) -> Json<ModelsResponse> {
    let config = state.service.config();
    Json(ModelsResponse::new(&[
        (config.api.model_id.as_str(), config.api.owned_by.as_str()),
        (config.llm.model.as_str(), config.llm.owner()),
    ]))
}

async fn handle_chat(
    State(state): State<ApiState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Json<ChatCompletionResponse>, AppError> {
    match state.service.chat(&request).await {
        Ok(response) => Ok(Json(response)),
        Err(ChatError::NoUserMessage) => {
            tracing::warn!("chat request without a user message");
            Err(bad_request(ChatError::NoUserMessage.to_string()))
        }
        Err(e) => {
            tracing::error!(error = %e, "chat generation failed");
            Err(internal(e.to_string()))
        }
    }
}

#[derive(Serialize)]
struct EmbeddingsStub {
    object: &'static str,
    data: Vec<serde_json::Value>,
    model: String,
}

async fn handle_embeddings(
    State(state): State<ApiState>,
    Json(_request): Json<serde_json::Value>,
) -> Json<EmbeddingsStub> {
    Json(EmbeddingsStub {
        object: "list",
        data: Vec::new(),
        model: {
            let config = state.service.config();
            config.embedding.model_for(&config.llm.provider).to_string()
        },
    })
}

#[derive(Debug, Serialize)]
pub struct DocumentEntry {
    pub filename: String,
    pub extension: String,
    pub size_bytes: u64,
    pub size_readable: String,
    /// Unix seconds, fractional.
    pub modified: f64,
}

#[derive(Serialize)]
struct IndexInfo {
    loaded: bool,
    num_chunks: usize,
}

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentEntry>,
    total_files: usize,
    index: IndexInfo,
    supported_extensions: Vec<&'static str>,
}

async fn handle_documents(State(state): State<ApiState>) -> Result<Json<DocumentsResponse>, AppError> {
    let documents = list_document_files(&state.service.config().paths.documents_dir).await?;
    let context = state.service.snapshot().await;

    Ok(Json(DocumentsResponse {
        total_files: documents.len(),
        documents,
        index: IndexInfo {
            loaded: context.index_loaded(),
            num_chunks: context.num_chunks(),
        },
        supported_extensions: SUPPORTED_EXTENSIONS.to_vec(),
    }))
}

/// Supported files directly inside `dir`, sorted by name. A missing
/// directory is an empty listing.
pub async fn list_document_files(dir: &Path) -> Result<Vec<DocumentEntry>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut documents = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().to_string();
        let Some(extension) = supported_extension(&filename) else {
            continue;
        };
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        documents.push(DocumentEntry {
            filename,
            extension,
            size_bytes: metadata.len(),
            size_readable: format_size_readable(metadata.len()),
            modified,
        });
    }

    documents.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(documents)
}

#[derive(Serialize)]
struct ReloadResponse {
    status: &'static str,
    message: &'static str,
    index_loaded: bool,
    query_engine_ready: bool,
}

async fn handle_reload(State(state): State<ApiState>) -> Result<Json<ReloadResponse>, AppError> {
    tracing::info!("reload requested");
    match state.service.reload().await {
        Ok(context) => Ok(Json(ReloadResponse {
            status: "success",
            message: "Reindicizzazione completata con successo",
            index_loaded: context.index_loaded(),
            query_engine_ready: context.query_engine_ready(),
        })),
        Err(e) => {
            tracing::error!(error = %e, "reload failed");
            let message = format!("Errore durante la reindicizzazione: {}", e);
            Err(match e {
                SetupError::MissingApiKey(_) => not_configured(message),
                _ => internal(message),
            })
        }
    }
}
