//! Runs the `docrag` binary against a temporary workspace.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docrag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docrag");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[paths]
documents_dir = "{root}/documents"
index_dir = "{root}/storage"
database = "{root}/data/admin.db"
sentinel = "{root}/REINDEX_REQUIRED"

[chunking]
chunk_size = 256
chunk_overlap = 32
"#,
        root = root.display()
    );
    let config_path = config_dir.join("docrag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docrag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docrag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docrag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database_and_directories() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docrag(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/admin.db").exists());
    assert!(tmp.path().join("documents").is_dir());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, first) = run_docrag(&config_path, &["init"]);
    let (_, stderr, second) = run_docrag(&config_path, &["init"]);
    assert!(first);
    assert!(second, "second init failed: {}", stderr);
}

#[test]
fn test_stats_on_empty_store() {
    let (_tmp, config_path) = setup_test_env();
    run_docrag(&config_path, &["init"]);

    let (stdout, stderr, success) = run_docrag(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Stored:      0"));
    assert!(stdout.contains("not requested"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[chunking]\nchunk_size = 10\nchunk_overlap = 20\n").unwrap();

    let (_, stderr, success) = run_docrag(&bad, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"));
}

#[test]
fn test_smoke_fails_when_api_is_down() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_docrag(
        &config_path,
        &["smoke", "--api-url", "http://127.0.0.1:9"],
    );
    assert!(!success);
    assert!(stdout.contains("API service unavailable"));
}
