//! Shared fakes for the integration tests: a deterministic hashing
//! embedder, a recording chat model and a provider factory wiring them into
//! the real vector index engine.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use docrag::config::Config;
use docrag::embedding::EmbeddingProvider;
use docrag::engine::VectorIndexEngine;
use docrag::llm::ChatModel;
use docrag::rag::{Backend, ProviderFactory};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const DIMS: usize = 64;

/// Bag-of-words vectors: each lowercase word bumps one of 64 buckets.
pub struct HashEmbedder;

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-64"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }
}

fn hash_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        // FNV-1a
        let mut h: u64 = 0xcbf29ce484222325;
        for b in word.to_lowercase().bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        v[(h % DIMS as u64) as usize] += 1.0;
    }
    v[0] += 0.01;
    v
}

/// Rejects every request the way a quota-exhausted hosted API does.
pub struct QuotaExceededEmbedder;

#[async_trait]
impl EmbeddingProvider for QuotaExceededEmbedder {
    fn model_name(&self) -> &str {
        "quota-exceeded"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("429 quota exceeded")
    }
}

/// Records every prompt; answers with a fixed reply or fails.
pub struct FakeChat {
    pub reply: String,
    pub fail: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeChat {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            fail: false,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: String::new(),
            fail: true,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    fn model_name(&self) -> &str {
        "fake-chat"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            bail!("model unavailable");
        }
        Ok(self.reply.clone())
    }
}

/// Builds backends around one shared [`FakeChat`] and counts how often it
/// was asked to.
pub struct FakeProviders {
    pub chat: Arc<FakeChat>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub created: AtomicUsize,
}

impl FakeProviders {
    pub fn new(chat: Arc<FakeChat>) -> Arc<Self> {
        Self::with_embedder(chat, Arc::new(HashEmbedder))
    }

    pub fn with_embedder(chat: Arc<FakeChat>, embedder: Arc<dyn EmbeddingProvider>) -> Arc<Self> {
        Arc::new(Self {
            chat,
            embedder,
            created: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ProviderFactory for FakeProviders {
    fn create(&self, config: &Config, _api_key: &str) -> Result<Backend> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let llm: Arc<dyn ChatModel> = self.chat.clone();
        let engine = VectorIndexEngine::new(
            self.embedder.clone(),
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

/// A one-page PDF whose only text run is `phrase`.
pub fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n");
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// `multipart/form-data` body with one `files` part per `(name, bytes)`.
pub fn multipart_body(boundary: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, bytes) in files {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n",
                name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

pub fn basic_auth(user: &str, pass: &str) -> String {
    use base64::Engine;
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, pass))
    )
}
