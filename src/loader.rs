//! Documents-directory scanner.
//!
//! Walks the documents directory recursively, keeps the files whose
//! extension is one of [`SUPPORTED_EXTENSIONS`] (case-insensitive), and
//! reduces each to a [`SourceDocument`] via [`crate::extract`]. A file that
//! fails extraction is skipped with a warning; it never aborts the scan.

use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::extract::extract_file;
use crate::models::{supported_extension, SourceDocument, SUPPORTED_EXTENSIONS};

/// Lists supported files under `root`, sorted by path.
pub fn scan_paths(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        bail!("Documents directory does not exist: {}", root.display());
    }

    let include = supported_globset()?;
    let mut paths = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if include.is_match(relative) {
            paths.push(path.to_path_buf());
        }
    }

    paths.sort();
    Ok(paths)
}

/// Scans `root` and extracts every supported file.
pub fn load_documents(root: &Path) -> Result<Vec<SourceDocument>> {
    let mut documents = Vec::new();

    for path in scan_paths(root)? {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let Some(extension) = supported_extension(&file_name) else {
            continue;
        };

        match extract_file(&path, &extension) {
            Ok(text) if text.trim().is_empty() => {
                tracing::warn!(file = %file_name, "no text extracted, skipping");
            }
            Ok(text) => documents.push(SourceDocument {
                file_name,
                path,
                extension,
                text,
            }),
            Err(e) => {
                tracing::warn!(file = %file_name, error = %e, "extraction failed, skipping");
            }
        }
    }

    tracing::info!(root = %root.display(), documents = documents.len(), "documents loaded");
    Ok(documents)
}

fn supported_globset() -> Result<GlobSet> {
    let exts: Vec<&str> = SUPPORTED_EXTENSIONS
        .iter()
        .map(|e| e.trim_start_matches('.'))
        .collect();
    let pattern = format!("**/*.{{{}}}", exts.join(","));

    let mut builder = GlobSetBuilder::new();
    builder.add(
        GlobBuilder::new(&pattern)
            .case_insensitive(true)
            .literal_separator(false)
            .build()?,
    );
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scan_is_recursive_and_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("hr/2024")).unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();
        std::fs::write(tmp.path().join("hr/2024/Policy.MD"), "b").unwrap();
        std::fs::write(tmp.path().join("image.png"), "c").unwrap();
        std::fs::write(tmp.path().join("README"), "d").unwrap();

        let paths = scan_paths(tmp.path()).unwrap();
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "Policy.MD"]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(scan_paths(&tmp.path().join("nope")).is_err());
    }

    #[test]
    fn broken_and_empty_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("good.md"), "# Ferie\n\n25 giorni").unwrap();
        std::fs::write(tmp.path().join("broken.pdf"), "not a pdf").unwrap();
        std::fs::write(tmp.path().join("blank.txt"), "   \n").unwrap();

        let docs = load_documents(tmp.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_name, "good.md");
        assert_eq!(docs[0].extension, ".md");
        assert!(docs[0].text.contains("25 giorni"));
    }
}
