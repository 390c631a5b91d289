//! RAG service state and lifecycle.
//!
//! [`RagService`] owns the live [`RagContext`]: the configured model
//! [`Backend`] (if any) and the loaded [`VectorIndex`] (if any). Handlers
//! take a cheap `Arc` snapshot of the context and never hold a lock while
//! a query runs, so a rebuild in progress leaves readers on the previous
//! snapshot until the new one is swapped in.
//!
//! # Setup sequence
//!
//! ```text
//! sentinel present? ──yes──▶ take it, delete index dir, clear indexed flags
//!        │
//!        ▼
//! API key ──missing──▶ SetupError::MissingApiKey
//!        │
//!        ▼
//! ProviderFactory::create ──▶ Backend { llm, engine }
//!        │
//!        ▼
//! engine.load(index dir) ──none──▶ scan documents ──▶ build ──▶ persist
//!        │                                │           mark_indexed, history
//!        │                              error ──▶ no index, model answers directly
//!        ▼
//! swap in new RagContext
//! ```
//!
//! Setups are serialized. A failed setup leaves the current context in
//! place. A failed index build is not a failed setup: the backend is kept
//! and chat falls back to the model alone. Filesystem work on the index
//! runs on the blocking pool.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::embedding;
use crate::engine::{IndexEngine, QueryAnswer, VectorIndexEngine};
use crate::index::{remove_index_dir, VectorIndex};
use crate::llm::{create_chat_model, ChatModel};
use crate::loader::load_documents;
use crate::openai::{ChatCompletionRequest, ChatCompletionResponse, Conversation, CITATION_MARKER};
use crate::pool::WorkerPool;
use crate::reindex::ReindexSignal;
use crate::store::{DocumentStore, ACTION_INDEX_REBUILT};

pub const NO_RAG_NOTICE: &str = "\n\n⚠️ *Risposta senza RAG (nessun documento caricato)*";
pub const NOT_INITIALIZED: &str = "❌ Sistema non inizializzato. Riavvia il server.";

/// The model-facing half of a context.
#[derive(Clone)]
pub struct Backend {
    pub llm: Arc<dyn ChatModel>,
    pub engine: Arc<dyn IndexEngine>,
}

/// Builds a [`Backend`] from configuration and an API key.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, config: &Config, api_key: &str) -> Result<Backend>;
}

/// Hosted Gemini / OpenAI-compatible models with the vector index engine.
pub struct HostedProviders;

impl ProviderFactory for HostedProviders {
    fn create(&self, config: &Config, api_key: &str) -> Result<Backend> {
        let llm = create_chat_model(&config.llm, api_key)?;
        let embedder = embedding::create_provider(&config.llm, &config.embedding, api_key)?;
        let engine = VectorIndexEngine::new(
            embedder,
            llm.clone(),
            config.chunking.clone(),
            config.embedding.batch_size,
        );
        Ok(Backend {
            llm,
            engine: Arc::new(engine),
        })
    }
}

#[derive(Clone, Default)]
pub struct RagContext {
    pub backend: Option<Backend>,
    pub index: Option<Arc<VectorIndex>>,
}

impl RagContext {
    pub fn llm_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub fn index_loaded(&self) -> bool {
        self.index.is_some()
    }

    pub fn query_engine_ready(&self) -> bool {
        self.backend.is_some() && self.index.is_some()
    }

    pub fn num_chunks(&self) -> usize {
        self.index.as_ref().map(|i| i.len()).unwrap_or(0)
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("API key not configured: set {0}")]
    MissingApiKey(String),
    #[error("reindex signal: {0:#}")]
    Signal(anyhow::Error),
    #[error("document store: {0:#}")]
    Store(anyhow::Error),
    #[error("model backend: {0:#}")]
    Backend(anyhow::Error),
    #[error("index build failed: {0:#}")]
    Index(anyhow::Error),
    #[error("worker failed: {0:#}")]
    Worker(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Nessun messaggio utente trovato")]
    NoUserMessage,
    #[error("Errore nella generazione: {0:#}")]
    Generation(anyhow::Error),
}

pub struct RagService {
    config: Config,
    store: DocumentStore,
    signal: ReindexSignal,
    providers: Arc<dyn ProviderFactory>,
    api_key: Option<String>,
    context: RwLock<Arc<RagContext>>,
    setup_lock: Mutex<()>,
    pool: WorkerPool,
}

impl RagService {
    /// Creates an unconfigured service. The API key is read from the
    /// environment variable named by `llm.api_key_env`.
    pub fn new(config: Config, store: DocumentStore, providers: Arc<dyn ProviderFactory>) -> Self {
        let api_key = std::env::var(config.llm.api_key_var())
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::with_api_key(config, store, providers, api_key)
    }

    pub fn with_api_key(
        config: Config,
        store: DocumentStore,
        providers: Arc<dyn ProviderFactory>,
        api_key: Option<String>,
    ) -> Self {
        let signal = ReindexSignal::new(&config.paths.sentinel);
        let pool = WorkerPool::new(config.api.workers);
        Self {
            config,
            store,
            signal,
            providers,
            api_key,
            context: RwLock::new(Arc::new(RagContext::default())),
            setup_lock: Mutex::new(()),
            pool,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn snapshot(&self) -> Arc<RagContext> {
        self.context.read().await.clone()
    }

    /// Runs the setup sequence once; a failure is logged and the service
    /// keeps its empty context.
    pub async fn start(&self) {
        if let Err(e) = self.setup().await {
            tracing::error!(error = %e, "RAG setup failed, serving without a query engine");
        }
    }

    pub async fn setup(&self) -> Result<Arc<RagContext>, SetupError> {
        let _guard = self.setup_lock.lock().await;
        let started = Instant::now();
        let index_dir = &self.config.paths.index_dir;

        if let Some(token) = self.signal.take().map_err(SetupError::Signal)? {
            tracing::info!(
                token = token.id.as_deref().unwrap_or("-"),
                requested_by = %token.requested_by,
                "reindex requested, discarding persisted index"
            );
            let dir = index_dir.clone();
            tokio::task::spawn_blocking(move || remove_index_dir(&dir))
                .await
                .map_err(|e| SetupError::Worker(e.into()))?
                .map_err(SetupError::Index)?;
            self.store
                .clear_indexed()
                .await
                .map_err(SetupError::Store)?;
        }

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SetupError::MissingApiKey(self.config.llm.api_key_var().to_string()))?;
        let backend = self
            .providers
            .create(&self.config, api_key)
            .map_err(SetupError::Backend)?;
        tracing::info!(model = %backend.llm.model_name(), "model backend configured");

        let engine = Arc::clone(&backend.engine);
        let dir = index_dir.clone();
        let mut index = tokio::task::spawn_blocking(move || engine.load(&dir))
            .await
            .map_err(|e| SetupError::Worker(e.into()))?;
        if index.is_none() {
            index = match self.rebuild(&backend).await {
                Ok(index) => index,
                Err(SetupError::Index(e)) => {
                    tracing::error!(error = %format!("{:#}", e), "index build failed, answering without retrieval");
                    None
                }
                Err(e) => return Err(e),
            };
        }

        let context = Arc::new(RagContext {
            backend: Some(backend),
            index: index.map(Arc::new),
        });
        *self.context.write().await = context.clone();

        tracing::info!(
            index_loaded = context.index_loaded(),
            chunks = context.num_chunks(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "RAG context ready"
        );
        Ok(context)
    }

    /// Scans the documents directory and builds, persists and records a new
    /// index. `None` when there is nothing to index. Scan, build and persist
    /// failures are `SetupError::Index`.
    async fn rebuild(&self, backend: &Backend) -> Result<Option<VectorIndex>, SetupError> {
        let documents_dir = self.config.paths.documents_dir.clone();
        let documents = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&documents_dir)?;
            load_documents(&documents_dir)
        })
        .await
        .map_err(|e| SetupError::Worker(e.into()))?
        .map_err(SetupError::Index)?;

        if documents.is_empty() {
            tracing::warn!(
                path = %self.config.paths.documents_dir.display(),
                "no documents to index"
            );
            return Ok(None);
        }

        let index = backend
            .engine
            .build(&documents)
            .await
            .map_err(SetupError::Index)?;
        let engine = Arc::clone(&backend.engine);
        let dir = self.config.paths.index_dir.clone();
        let index = tokio::task::spawn_blocking(move || engine.persist(&index, &dir).map(|_| index))
            .await
            .map_err(|e| SetupError::Worker(e.into()))?
            .map_err(SetupError::Index)?;

        let sources = index.sources().to_vec();
        let marked = self
            .store
            .mark_indexed(&sources)
            .await
            .map_err(SetupError::Store)?;
        self.store
            .record_history(ACTION_INDEX_REBUILT, sources.len() as i64)
            .await
            .map_err(SetupError::Store)?;

        tracing::info!(
            documents = sources.len(),
            records_marked = marked,
            chunks = index.len(),
            "index rebuilt"
        );
        Ok(Some(index))
    }

    /// Writes the sentinel and runs setup on the worker pool.
    pub async fn reload(self: &Arc<Self>) -> Result<Arc<RagContext>, SetupError> {
        self.signal.request("api").map_err(SetupError::Signal)?;
        let service = Arc::clone(self);
        self.pool
            .run(async move { Ok(service.setup().await) })
            .await
            .map_err(SetupError::Worker)?
    }

    pub async fn chat(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ChatError> {
        let conversation =
            Conversation::from_messages(&request.messages).ok_or(ChatError::NoUserMessage)?;
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.api.model_id.clone());

        tracing::info!(
            question_chars = conversation.question.chars().count(),
            history = conversation.history.len(),
            "chat request"
        );

        let context = self.snapshot().await;
        let query = conversation.query_text();
        let top_k = self.config.retrieval.top_k;
        let started = Instant::now();

        let content = self
            .pool
            .run(async move { answer(&context, &query, top_k).await })
            .await
            .map_err(ChatError::Generation)?;

        tracing::info!(
            answer_chars = content.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chat answered"
        );
        Ok(ChatCompletionResponse::new(model, content))
    }
}

/// Answers `query` with whatever `context` has available.
pub async fn answer(context: &RagContext, query: &str, top_k: usize) -> Result<String> {
    match (&context.backend, &context.index) {
        (Some(backend), Some(index)) => {
            let result = backend.engine.query(index, query, top_k).await?;
            Ok(with_citations(&result))
        }
        (Some(backend), None) => {
            let reply = backend.llm.complete(query).await?;
            Ok(format!("{}{}", reply, NO_RAG_NOTICE))
        }
        (None, _) => Ok(NOT_INITIALIZED.to_string()),
    }
}

/// Appends the `📚 Fonti` block listing each source and its score.
pub fn with_citations(result: &QueryAnswer) -> String {
    let mut out = result.answer.clone();
    if result.sources.is_empty() {
        return out;
    }
    out.push_str(CITATION_MARKER);
    out.push('\n');
    for source in &result.sources {
        out.push_str(&format!(
            "- {} (rilevanza: {:.2})\n",
            source.file_name, source.score
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SourceRef;

    #[test]
    fn citation_block_format() {
        let text = with_citations(&QueryAnswer {
            answer: "Sono 25 giorni.".to_string(),
            sources: vec![
                SourceRef {
                    file_name: "ferie.pdf".to_string(),
                    score: 0.9134,
                    text: String::new(),
                },
                SourceRef {
                    file_name: "hr.md".to_string(),
                    score: 0.5,
                    text: String::new(),
                },
            ],
        });
        assert_eq!(
            text,
            "Sono 25 giorni.\n\n---\n📚 **Fonti:**\n- ferie.pdf (rilevanza: 0.91)\n- hr.md (rilevanza: 0.50)\n"
        );
    }

    #[test]
    fn no_sources_no_block() {
        let text = with_citations(&QueryAnswer {
            answer: "Non lo so.".to_string(),
            sources: vec![],
        });
        assert_eq!(text, "Non lo so.");
    }

    #[tokio::test]
    async fn empty_context_reports_not_initialized() {
        let reply = answer(&RagContext::default(), "ciao", 5).await.unwrap();
        assert_eq!(reply, NOT_INITIALIZED);
    }

    #[test]
    fn context_flags() {
        let ctx = RagContext::default();
        assert!(!ctx.llm_configured());
        assert!(!ctx.index_loaded());
        assert!(!ctx.query_engine_ready());
        assert_eq!(ctx.num_chunks(), 0);
    }
}
