//! Document store: uploaded files in a flat directory plus their metadata
//! rows in SQLite.
//!
//! The store only does bookkeeping. It never reads file contents back; the
//! API service scans the directory itself when it rebuilds the index.

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::db;
use crate::migrate;
use crate::models::{supported_extension, DocumentRecord, HistoryEntry};
use crate::stats::StoreStats;

/// History action appended when an administrator requests a reindex.
pub const ACTION_REINDEX_REQUESTED: &str = "reindex_requested";
/// History action appended when the API service has rebuilt the index.
pub const ACTION_INDEX_REBUILT: &str = "index_rebuilt";

/// Why a single uploaded file was not stored.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unsupported format")]
    UnsupportedFormat,
    #[error("invalid file name")]
    InvalidName,
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One file received in an upload request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Outcome of a batch upload. Failures are collected, never fatal.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub uploaded: Vec<DocumentRecord>,
    /// `"{file name}: {reason}"` for each rejected file.
    pub errors: Vec<String>,
}

#[derive(Debug, PartialEq)]
pub enum DeleteOutcome {
    Deleted(DocumentRecord),
    NotFound,
}

#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
    documents_dir: PathBuf,
}

impl DocumentStore {
    /// Connects to the database, runs migrations and makes sure the
    /// documents directory exists.
    pub async fn open(database: &Path, documents_dir: &Path) -> Result<Self> {
        let pool = db::connect(database)
            .await
            .with_context(|| format!("Failed to open database: {}", database.display()))?;
        migrate::run_migrations(&pool).await?;
        std::fs::create_dir_all(documents_dir).with_context(|| {
            format!(
                "Failed to create documents directory: {}",
                documents_dir.display()
            )
        })?;
        Ok(Self::new(pool, documents_dir.to_path_buf()))
    }

    pub fn new(pool: SqlitePool, documents_dir: PathBuf) -> Self {
        Self {
            pool,
            documents_dir,
        }
    }

    pub fn documents_dir(&self) -> &Path {
        &self.documents_dir
    }

    pub async fn list(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            "SELECT id, filename, original_name, file_size, file_type, uploaded_at, indexed \
             FROM documents ORDER BY uploaded_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    pub async fn get(&self, id: i64) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(
            "SELECT id, filename, original_name, file_size, file_type, uploaded_at, indexed \
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(record_from_row))
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(CASE WHEN indexed THEN 1 ELSE 0 END), 0) AS indexed, \
             COALESCE(SUM(file_size), 0) AS size \
             FROM documents",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            total_docs: row.get("total"),
            indexed_docs: row.get("indexed"),
            total_size: row.get("size"),
        })
    }

    /// Stores one uploaded file and records it with `indexed = false`.
    pub async fn save_upload(
        &self,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<DocumentRecord, UploadError> {
        let file_name = sanitize_file_name(original_name).ok_or(UploadError::InvalidName)?;
        let ext = supported_extension(&file_name).ok_or(UploadError::UnsupportedFormat)?;

        let target = disambiguate(&self.documents_dir, &file_name, &ext);
        write_new_file(&target, bytes).await?;

        let stored_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.clone());
        let uploaded_at = Utc::now().timestamp();

        let inserted = sqlx::query(
            "INSERT INTO documents (filename, original_name, file_size, file_type, uploaded_at, indexed) \
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(&stored_name)
        .bind(original_name)
        .bind(bytes.len() as i64)
        .bind(&ext)
        .bind(uploaded_at)
        .execute(&self.pool)
        .await;

        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(e) => {
                // Keep file and table in step
                let _ = tokio::fs::remove_file(&target).await;
                return Err(e.into());
            }
        };

        tracing::info!(id, filename = %stored_name, bytes = bytes.len(), "document uploaded");

        Ok(DocumentRecord {
            id,
            filename: stored_name,
            original_name: original_name.to_string(),
            file_size: bytes.len() as i64,
            file_type: ext,
            uploaded_at,
            indexed: false,
        })
    }

    /// Stores every file it can and reports the rest.
    pub async fn upload_batch(&self, files: Vec<UploadedFile>) -> UploadReport {
        let mut report = UploadReport::default();
        for file in files {
            match self.save_upload(&file.name, &file.bytes).await {
                Ok(record) => report.uploaded.push(record),
                Err(e) => {
                    tracing::warn!(file = %file.name, error = %e, "upload rejected");
                    report.errors.push(format!("{}: {}", file.name, e));
                }
            }
        }
        report
    }

    /// Removes the document's file (a missing file is fine) and its row.
    pub async fn delete(&self, id: i64) -> Result<DeleteOutcome> {
        let record = match self.get(id).await? {
            Some(r) => r,
            None => return Ok(DeleteOutcome::NotFound),
        };

        let path = self.documents_dir.join(&record.filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "document file already missing");
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to remove {}", path.display()));
            }
        }

        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::info!(id, filename = %record.filename, "document deleted");
        Ok(DeleteOutcome::Deleted(record))
    }

    /// Resets every indexed flag and logs the request. Returns the number of
    /// documents that will be part of the next rebuild.
    pub async fn request_reindex(&self) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE documents SET indexed = 0")
            .execute(&mut *tx)
            .await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO index_history (action, documents_count, created_at) VALUES (?, ?, ?)",
        )
        .bind(ACTION_REINDEX_REQUESTED)
        .bind(count)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(count)
    }

    pub async fn clear_indexed(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE documents SET indexed = 0")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Flags the records whose stored file name is in `filenames`.
    pub async fn mark_indexed(&self, filenames: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for name in filenames {
            let result = sqlx::query("UPDATE documents SET indexed = 1 WHERE filename = ?")
                .bind(name)
                .execute(&mut *tx)
                .await?;
            updated += result.rows_affected();
        }
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn record_history(&self, action: &str, documents_count: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO index_history (action, documents_count, created_at) VALUES (?, ?, ?)",
        )
        .bind(action)
        .bind(documents_count)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent history entries first.
    pub async fn history(&self, limit: i64) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            "SELECT id, action, documents_count, created_at FROM index_history \
             ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| HistoryEntry {
                id: row.get("id"),
                action: row.get("action"),
                documents_count: row.get("documents_count"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

fn record_from_row(row: &SqliteRow) -> DocumentRecord {
    DocumentRecord {
        id: row.get("id"),
        filename: row.get("filename"),
        original_name: row.get("original_name"),
        file_size: row.get("file_size"),
        file_type: row.get("file_type"),
        uploaded_at: row.get("uploaded_at"),
        indexed: row.get("indexed"),
    }
}

/// Keeps only the final path component of a client-supplied name.
fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(last.to_string())
}

/// Picks a free path for `file_name`: the name itself, then
/// `{stem}_{YYYYmmdd_HHMMSS}{ext}`, then the same with `_{n}` appended.
fn disambiguate(dir: &Path, file_name: &str, ext: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    let base = format!("{}_{}", stem, Local::now().format("%Y%m%d_%H%M%S"));

    let mut candidate = dir.join(format!("{}{}", base, ext));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}_{}{}", base, n, ext));
        n += 1;
    }
    candidate
}

async fn write_new_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    let written = async {
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;
    if let Err(e) = written {
        drop(file);
        let _ = tokio::fs::remove_file(path).await;
        return Err(e);
    }
    Ok(())
}
