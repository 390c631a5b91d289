//! Reindex sentinel shared between the admin and API processes.
//!
//! A pending rebuild is represented by the existence of one file. The file
//! carries a [`ReindexToken`] so that a consumer can log which request it
//! is acting on; the content is informational and a file that cannot be
//! parsed still counts as a pending request.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReindexToken {
    pub id: Option<String>,
    pub requested_at: Option<DateTime<Utc>>,
    pub requested_by: String,
}

#[derive(Debug, Clone)]
pub struct ReindexSignal {
    path: PathBuf,
}

impl ReindexSignal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a fresh token, replacing any pending one.
    pub fn request(&self, requested_by: &str) -> Result<ReindexToken> {
        let token = ReindexToken {
            id: Some(Uuid::new_v4().to_string()),
            requested_at: Some(Utc::now()),
            requested_by: requested_by.to_string(),
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_string_pretty(&token)?;
        std::fs::write(&self.path, body)
            .with_context(|| format!("Failed to write reindex sentinel: {}", self.path.display()))?;
        tracing::info!(
            path = %self.path.display(),
            requested_by,
            token = token.id.as_deref().unwrap_or_default(),
            "reindex requested"
        );
        Ok(token)
    }

    pub fn is_pending(&self) -> bool {
        self.path.exists()
    }

    /// Consumes the pending request, if any.
    pub fn take(&self) -> Result<Option<ReindexToken>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            // Unreadable but present: still a request
            Err(_) => String::new(),
        };

        let token = serde_json::from_str(&content).unwrap_or_else(|_| ReindexToken {
            id: None,
            requested_at: None,
            requested_by: "unknown".to_string(),
        });

        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to remove reindex sentinel: {}", self.path.display())
                })
            }
        }

        Ok(Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn request_then_take_round_trip() {
        let tmp = TempDir::new().unwrap();
        let signal = ReindexSignal::new(tmp.path().join("REINDEX_REQUIRED"));
        assert!(!signal.is_pending());

        let written = signal.request("admin").unwrap();
        assert!(signal.is_pending());

        let taken = signal.take().unwrap().unwrap();
        assert_eq!(taken, written);
        assert!(!signal.is_pending());
        assert!(signal.take().unwrap().is_none());
    }

    #[test]
    fn second_request_replaces_the_first() {
        let tmp = TempDir::new().unwrap();
        let signal = ReindexSignal::new(tmp.path().join("REINDEX_REQUIRED"));
        signal.request("admin").unwrap();
        let latest = signal.request("api").unwrap();

        assert_eq!(signal.take().unwrap(), Some(latest));
    }

    #[test]
    fn free_form_content_still_counts() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("REINDEX_REQUIRED");
        std::fs::write(&path, "Reindex requested yesterday").unwrap();

        let token = ReindexSignal::new(&path).take().unwrap().unwrap();
        assert_eq!(token.id, None);
        assert_eq!(token.requested_by, "unknown");
        assert!(!path.exists());
    }
}
