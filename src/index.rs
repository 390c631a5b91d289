//! In-memory vector index and its on-disk form.
//!
//! An index is always built wholesale from the documents directory and
//! persisted as a directory of three files:
//!
//! | File            | Content                                                |
//! |-----------------|--------------------------------------------------------|
//! | `manifest.json` | format version, embedding model, dims, counts, sources |
//! | `chunks.json`   | [`Chunk`]s in vector order                             |
//! | `vectors.bin`   | `chunk_count × dims` little-endian `f32`s              |
//!
//! [`VectorIndex::write_to`] writes into a sibling temporary directory and
//! swaps it in with renames, so a reader never observes a half-written
//! index.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::Chunk;

pub const INDEX_FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.json";
const VECTORS_FILE: &str = "vectors.bin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub embedding_model: String,
    pub dims: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    /// File names of the documents that contributed chunks, sorted.
    pub sources: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    manifest: IndexManifest,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

/// A chunk and its similarity to the query.
#[derive(Debug, Clone, Copy)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
}

impl VectorIndex {
    /// Pairs `chunks` with their `vectors`; every vector must have the same
    /// non-zero length.
    pub fn new(embedding_model: &str, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != vectors.len() {
            bail!(
                "Index has {} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
        if vectors.iter().any(|v| v.len() != dims) {
            bail!("Embedding vectors have inconsistent dimensions");
        }
        if !vectors.is_empty() && dims == 0 {
            bail!("Embedding vectors are empty");
        }

        let sources: BTreeSet<String> = chunks.iter().map(|c| c.source.clone()).collect();
        let manifest = IndexManifest {
            version: INDEX_FORMAT_VERSION,
            embedding_model: embedding_model.to_string(),
            dims,
            chunk_count: chunks.len(),
            created_at: Utc::now(),
            sources: sources.into_iter().collect(),
        };

        Ok(Self {
            manifest,
            chunks,
            vectors,
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Document file names present in the index.
    pub fn sources(&self) -> &[String] {
        &self.manifest.sources
    }

    /// Brute-force cosine search; best match first.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<ScoredChunk<'_>> {
        let mut scored: Vec<ScoredChunk<'_>> = self
            .chunks
            .iter()
            .zip(&self.vectors)
            .map(|(chunk, vector)| ScoredChunk {
                chunk,
                score: cosine_similarity(query, vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        scored
    }

    /// Persists the index at `dir`, replacing whatever was there.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let (parent, name) = split_index_dir(dir)?;
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;

        let staging = parent.join(format!(".{}.tmp-{}", name, Uuid::new_v4()));
        if let Err(e) = self.write_files(&staging) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        let retired = parent.join(format!(".{}.old-{}", name, Uuid::new_v4()));
        let had_previous = dir.exists();
        if had_previous {
            std::fs::rename(dir, &retired)
                .with_context(|| format!("Failed to move aside {}", dir.display()))?;
        }
        if let Err(e) = std::fs::rename(&staging, dir) {
            if had_previous {
                let _ = std::fs::rename(&retired, dir);
            }
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e).with_context(|| format!("Failed to install index at {}", dir.display()));
        }
        if had_previous {
            if let Err(e) = std::fs::remove_dir_all(&retired) {
                tracing::warn!(path = %retired.display(), error = %e, "failed to remove previous index");
            }
        }

        tracing::info!(
            path = %dir.display(),
            chunks = self.len(),
            sources = self.manifest.sources.len(),
            "index persisted"
        );
        Ok(())
    }

    fn write_files(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&self.manifest)?,
        )?;
        std::fs::write(dir.join(CHUNKS_FILE), serde_json::to_vec(&self.chunks)?)?;

        let mut blob = Vec::with_capacity(self.len() * self.manifest.dims * 4);
        for vector in &self.vectors {
            blob.extend_from_slice(&vec_to_blob(vector));
        }
        std::fs::write(dir.join(VECTORS_FILE), blob)?;
        Ok(())
    }

    /// Reads an index written by [`write_to`](Self::write_to).
    pub fn read_from(dir: &Path) -> Result<Self> {
        let manifest_bytes = std::fs::read(dir.join(MANIFEST_FILE))
            .with_context(|| format!("No index manifest in {}", dir.display()))?;
        let manifest: IndexManifest =
            serde_json::from_slice(&manifest_bytes).context("Corrupt index manifest")?;
        if manifest.version != INDEX_FORMAT_VERSION {
            bail!(
                "Unsupported index format version {} (expected {})",
                manifest.version,
                INDEX_FORMAT_VERSION
            );
        }

        let chunks: Vec<Chunk> = serde_json::from_slice(&std::fs::read(dir.join(CHUNKS_FILE))?)
            .context("Corrupt index chunks")?;
        let blob = std::fs::read(dir.join(VECTORS_FILE))?;

        if chunks.len() != manifest.chunk_count {
            bail!(
                "Index manifest lists {} chunks, found {}",
                manifest.chunk_count,
                chunks.len()
            );
        }
        if blob.len() != manifest.chunk_count * manifest.dims * 4 {
            bail!("Index vectors file has unexpected size {}", blob.len());
        }

        let values = blob_to_vec(&blob);
        let vectors = if manifest.dims == 0 {
            Vec::new()
        } else {
            values.chunks(manifest.dims).map(|v| v.to_vec()).collect()
        };

        Ok(Self {
            manifest,
            chunks,
            vectors,
        })
    }
}

/// Deletes a persisted index. Returns whether anything was removed.
pub fn remove_index_dir(dir: &Path) -> Result<bool> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove index at {}", dir.display())),
    }
}

fn split_index_dir(dir: &Path) -> Result<(PathBuf, String)> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("Index path has no directory name: {}", dir.display()))?;
    let parent = match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((parent, name))
}
