//! Retrieval capability.
//!
//! [`IndexEngine`] is the seam between the services and whatever builds,
//! stores and queries the vector index. The API service and the CLI
//! prototype only ever talk to this trait; tests substitute fakes.
//!
//! ```text
//! documents ──build──▶ VectorIndex ──persist──▶ index dir
//!                          ▲    │
//!              index dir ──load  └──query(text, top_k)──▶ QueryAnswer
//! ```
//!
//! [`VectorIndexEngine`] is the shipped implementation: chunk, embed with an
//! [`EmbeddingProvider`], brute-force cosine search, and an answer from a
//! [`ChatModel`] constrained to the retrieved context.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::embedding::{embed_batched, embed_query, EmbeddingProvider};
use crate::index::VectorIndex;
use crate::llm::ChatModel;
use crate::models::SourceDocument;

/// Answer template. `{context_str}` receives the retrieved chunks and
/// `{query_str}` the question.
pub const QA_PROMPT_TEMPLATE: &str = "Sei un assistente helpdesk esperto e cordiale. Rispondi sempre in italiano in modo chiaro, dettagliato e professionale.\n\n\
Informazioni di contesto dai documenti:\n\
---------------------\n\
{context_str}\n\
---------------------\n\n\
Usando SOLO le informazioni di contesto sopra (non conoscenze esterne), rispondi alla seguente domanda in modo completo e ben formattato.\n\
Se la risposta contiene passaggi o istruzioni, usa elenchi numerati.\n\
Se non trovi informazioni sufficienti nel contesto, dillo chiaramente.\n\n\
Domanda: {query_str}\n\n\
Risposta dettagliata:";

/// A retrieved chunk cited by an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub file_name: String,
    pub score: f32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

#[async_trait]
pub trait IndexEngine: Send + Sync {
    /// Builds a fresh index over `documents`.
    async fn build(&self, documents: &[SourceDocument]) -> Result<VectorIndex>;

    /// Loads a persisted index. Any failure is logged and reported as `None`.
    fn load(&self, dir: &Path) -> Option<VectorIndex>;

    fn persist(&self, index: &VectorIndex, dir: &Path) -> Result<()>;

    async fn query(&self, index: &VectorIndex, text: &str, top_k: usize) -> Result<QueryAnswer>;
}

pub struct VectorIndexEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn ChatModel>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl VectorIndexEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn ChatModel>,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            llm,
            chunking,
            batch_size,
        }
    }
}

#[async_trait]
impl IndexEngine for VectorIndexEngine {
    async fn build(&self, documents: &[SourceDocument]) -> Result<VectorIndex> {
        let started = Instant::now();
        let chunks: Vec<_> = documents
            .iter()
            .flat_map(|doc| {
                chunk_text(
                    &doc.file_name,
                    &doc.text,
                    self.chunking.chunk_size,
                    self.chunking.chunk_overlap,
                )
            })
            .collect();
        if chunks.is_empty() {
            bail!("No text to index in {} documents", documents.len());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_batched(self.embedder.as_ref(), &texts, self.batch_size).await?;
        let index = VectorIndex::new(self.embedder.model_name(), chunks, vectors)?;

        tracing::info!(
            documents = documents.len(),
            chunks = index.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index built"
        );
        Ok(index)
    }

    fn load(&self, dir: &Path) -> Option<VectorIndex> {
        if !dir.exists() {
            tracing::debug!(path = %dir.display(), "no persisted index");
            return None;
        }
        match VectorIndex::read_from(dir) {
            Ok(index) if index.manifest().embedding_model != self.embedder.model_name() => {
                tracing::warn!(
                    path = %dir.display(),
                    index_model = %index.manifest().embedding_model,
                    current_model = %self.embedder.model_name(),
                    "persisted index was built with a different embedding model, ignoring it"
                );
                None
            }
            Ok(index) => {
                tracing::info!(path = %dir.display(), chunks = index.len(), "index loaded");
                Some(index)
            }
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "failed to load persisted index");
                None
            }
        }
    }

    fn persist(&self, index: &VectorIndex, dir: &Path) -> Result<()> {
        index.write_to(dir)
    }

    async fn query(&self, index: &VectorIndex, text: &str, top_k: usize) -> Result<QueryAnswer> {
        let query_vector = embed_query(self.embedder.as_ref(), text).await?;
        let hits = index.search(&query_vector, top_k);

        let context = hits
            .iter()
            .map(|hit| format!("file_name: {}\n\n{}", hit.chunk.source, hit.chunk.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = render_prompt(&context, text);

        let answer = self.llm.complete(&prompt).await?;
        tracing::debug!(hits = hits.len(), answer_chars = answer.len(), "query answered");

        Ok(QueryAnswer {
            answer,
            sources: hits
                .into_iter()
                .map(|hit| SourceRef {
                    file_name: hit.chunk.source.clone(),
                    score: hit.score,
                    text: hit.chunk.text.clone(),
                })
                .collect(),
        })
    }
}

pub fn render_prompt(context: &str, question: &str) -> String {
    QA_PROMPT_TEMPLATE
        .replace("{context_str}", context)
        .replace("{query_str}", question)
}
