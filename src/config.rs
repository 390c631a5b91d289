//! TOML configuration shared by every `docrag` component.
//!
//! All sections are optional; a missing file or a missing key falls back to
//! the defaults below, which mirror a single-host deployment with the
//! documents directory, index directory, SQLite file and reindex sentinel
//! all living in the working directory.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default = "default_sentinel")]
    pub sentinel: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            index_dir: default_index_dir(),
            database: default_database(),
            sentinel: default_sentinel(),
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("./documents")
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("./storage")
}
fn default_database() -> PathBuf {
    PathBuf::from("./admin.db")
}
fn default_sentinel() -> PathBuf {
    PathBuf::from("./REINDEX_REQUIRED")
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    #[serde(default = "default_admin_bind")]
    pub bind: String,
    /// Base URL of the API service. When set, a reindex request also calls
    /// `POST {api_url}/reload` instead of waiting for the next restart.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind: default_admin_bind(),
            api_url: None,
            username: None,
            password: None,
        }
    }
}

fn default_admin_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind")]
    pub bind: String,
    /// Model id advertised by `/v1/models` for the retrieval pipeline.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_owned_by")]
    pub owned_by: String,
    /// Size of the worker pool that runs queries and reloads.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_api_bind(),
            model_id: default_model_id(),
            owned_by: default_owned_by(),
            workers: default_workers(),
        }
    }
}

fn default_api_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_model_id() -> String {
    "rag-gemini".to_string()
}
fn default_owned_by() -> String {
    "docrag".to_string()
}
fn default_workers() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Name of the environment variable holding the provider API key.
    /// Defaults to `GOOGLE_API_KEY` for gemini and `OPENAI_API_KEY` for openai.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_llm_model(),
            api_key_env: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_llm_timeout() -> u64 {
    120
}

impl LlmConfig {
    pub fn api_key_var(&self) -> &str {
        match &self.api_key_env {
            Some(name) => name,
            None if self.provider == "openai" => "OPENAI_API_KEY",
            None => "GOOGLE_API_KEY",
        }
    }

    pub fn base_url(&self) -> &str {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/'),
            None if self.provider == "openai" => "https://api.openai.com",
            None => "https://generativelanguage.googleapis.com",
        }
    }

    /// Owner reported for the underlying model in `/v1/models`.
    pub fn owner(&self) -> &str {
        if self.provider == "openai" {
            "openai"
        } else {
            "google"
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Defaults to `models/text-embedding-004` for gemini and
    /// `text-embedding-3-small` for openai. See [`EmbeddingConfig::model_for`].
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout() -> u64 {
    60
}

impl EmbeddingConfig {
    /// Embedding model for `provider`, the configured one if set.
    pub fn model_for(&self, provider: &str) -> &str {
        match &self.model {
            Some(model) => model,
            None if provider == "openai" => "text-embedding-3-small",
            None => "models/text-embedding-004",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

impl Config {
    /// Builds a config whose paths all live under `root`. Used by tests and
    /// by callers that want an isolated workspace.
    pub fn rooted_at(root: &Path) -> Self {
        let mut config = Config::default();
        config.paths = PathsConfig {
            documents_dir: root.join("documents"),
            index_dir: root.join("storage"),
            database: root.join("admin.db"),
            sentinel: root.join("REINDEX_REQUIRED"),
        };
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
        }
        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.api.workers < 1 {
            bail!("api.workers must be >= 1");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        match self.llm.provider.as_str() {
            "gemini" | "openai" => {}
            other => bail!(
                "Unknown llm provider: '{}'. Must be gemini or openai.",
                other
            ),
        }
        Ok(())
    }
}

/// Loads the config file at `path`, or the defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_single_host_layout() {
        let cfg = Config::default();
        assert_eq!(cfg.paths.sentinel, PathBuf::from("./REINDEX_REQUIRED"));
        assert_eq!(cfg.admin.bind, "0.0.0.0:8080");
        assert_eq!(cfg.api.bind, "0.0.0.0:8000");
        assert_eq!(cfg.api.workers, 4);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.chunking.chunk_size, 512);
        assert_eq!(cfg.chunking.chunk_overlap, 50);
        assert_eq!(cfg.llm.api_key_var(), "GOOGLE_API_KEY");
        assert_eq!(cfg.embedding.model_for(&cfg.llm.provider), "models/text-embedding-004");
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [llm]
            provider = "openai"
            model = "gpt-4o-mini"

            [retrieval]
            top_k = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.llm.api_key_var(), "OPENAI_API_KEY");
        assert_eq!(cfg.llm.base_url(), "https://api.openai.com");
        assert_eq!(cfg.llm.owner(), "openai");
        assert_eq!(cfg.embedding.model_for(&cfg.llm.provider), "text-embedding-3-small");
        assert_eq!(cfg.retrieval.top_k, 3);
        assert_eq!(cfg.paths.documents_dir, PathBuf::from("./documents"));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk() {
        let mut cfg = Config::default();
        cfg.chunking.chunk_overlap = cfg.chunking.chunk_size;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_provider() {
        let mut cfg = Config::default();
        cfg.llm.provider = "llamafile".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("llamafile"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.api.model_id, "rag-gemini");
    }
}
