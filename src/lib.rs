//! # docrag
//!
//! Upload documents through an admin panel, chat with them through an
//! OpenAI-compatible API.
//!
//! Two services and two commands share one documents directory, one
//! SQLite file and a sentinel file:
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  files + rows   ┌──────────────────┐
//! │ Admin panel  │────────────────▶│ documents/ +     │
//! │ (Basic auth) │                 │ SQLite metadata  │
//! └──────┬───────┘                 └────────┬─────────┘
//!        │ REINDEX_REQUIRED                 │ scan, chunk, embed
//!        │ (+ POST /reload)                 ▼
//!        │                         ┌──────────────────┐
//!        └────────────────────────▶│ RAG API service  │◀── OpenAI clients
//!                                  │ vector index     │
//!                                  └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`telemetry`] | Tracing subscriber setup |
//! | [`models`] | Core data types |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`store`] | Document records, uploads, index history |
//! | [`stats`] | Store statistics and `docrag stats` |
//! | [`reindex`] | Reindex sentinel file |
//! | [`auth`] | Basic-auth credential checking |
//! | [`admin_page`] | Dashboard HTML |
//! | [`admin_server`] | Admin panel HTTP service |
//! | [`extract`] | Text extraction (PDF, DOCX, plain text) |
//! | [`loader`] | Document folder scanning |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Chat model abstraction |
//! | [`index`] | Persisted vector index |
//! | [`engine`] | Build / load / query capability |
//! | [`pool`] | Bounded worker pool |
//! | [`openai`] | OpenAI wire types |
//! | [`rag`] | RAG service state and chat |
//! | [`error`] | JSON error envelope |
//! | [`api_server`] | RAG API HTTP service |
//! | [`prototype`] | Terminal chat prototype |
//! | [`smoke`] | Smoke test against a running API |

pub mod admin_page;
pub mod admin_server;
pub mod api_server;
pub mod auth;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod index;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod openai;
pub mod pool;
pub mod prototype;
pub mod rag;
pub mod reindex;
pub mod smoke;
pub mod stats;
pub mod store;
pub mod telemetry;
