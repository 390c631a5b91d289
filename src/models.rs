//! Core data types shared by the admin service, the API service and the
//! index pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File extensions accepted for upload and indexing, lower-case with the dot.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = [".pdf", ".txt", ".docx", ".md"];

/// Returns the lower-cased extension of `name` (with leading dot) if it is
/// one of [`SUPPORTED_EXTENSIONS`].
pub fn supported_extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
    let dotted = format!(".{}", ext);
    SUPPORTED_EXTENSIONS
        .contains(&dotted.as_str())
        .then_some(dotted)
}

/// A row of the `documents` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    /// Name of the file inside the documents directory.
    pub filename: String,
    /// Name the file had when it was uploaded.
    pub original_name: String,
    pub file_size: i64,
    pub file_type: String,
    /// Unix seconds.
    pub uploaded_at: i64,
    pub indexed: bool,
}

/// A row of the `index_history` table.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: i64,
    pub action: String,
    pub documents_count: i64,
    pub created_at: i64,
}

/// A document read from disk and reduced to plain text, ready for chunking.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File name (no directories); used for citations.
    pub file_name: String,
    pub path: PathBuf,
    pub extension: String,
    pub text: String,
}

/// A chunk of a document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// File name of the document the chunk came from.
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}
