//! End-to-end tests that run the compiled `ra` binary.
//!
//! Providers are configured as `ollama` so no credentials are needed, and
//! every test stays off the network: either the index is missing or the
//! command fails before any provider call.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ra_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ra");
    path
}

fn setup_test_env(provider: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[index]
path = "{root}/data/index"

[chunking]
chunk_size = 500
chunk_overlap = 50

[embedding]
provider = "{provider}"
url = "http://127.0.0.1:9"

[llm]
provider = "{provider}"
url = "http://127.0.0.1:9"

[transcript]
dir = "{root}/data/logs"
"#,
        root = root.display(),
        provider = provider
    );

    let config_path = config_dir.join("ra.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ra(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ra_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("GEMINI_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ra binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_status_without_index() {
    let (_tmp, config_path) = setup_test_env("ollama");

    let (stdout, stderr, success) = run_ra(&config_path, &["status"]);
    assert!(success, "status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Status: not built"));
    assert!(stdout.contains("index.vec is missing"));
}

#[test]
fn test_ask_without_index_degrades() {
    let (tmp, config_path) = setup_test_env("ollama");

    let (stdout, stderr, success) = run_ra(&config_path, &["ask", "What is Rust?"]);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("No documents loaded. Please upload documents first."));
    assert!(stdout.contains("No sources found for this query."));

    let logs: Vec<_> = fs::read_dir(tmp.path().join("data/logs")).unwrap().collect();
    assert_eq!(logs.len(), 1);
}

#[test]
fn test_build_requires_a_source() {
    let (_tmp, config_path) = setup_test_env("ollama");

    let (_stdout, stderr, success) = run_ra(&config_path, &["build"]);
    assert!(!success);
    assert!(stderr.contains("Upload files or enter a Wikipedia topic."));
}

#[test]
fn test_build_with_only_empty_files_reports_hint() {
    let (tmp, config_path) = setup_test_env("ollama");
    let blank = tmp.path().join("blank.txt");
    fs::write(&blank, "   \n").unwrap();

    let (_stdout, stderr, success) = run_ra(&config_path, &["build", blank.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("no documents loaded"));
    assert!(stderr.contains("Upload a document"));
    assert!(!tmp.path().join("data/index/index.vec").exists());
}

#[test]
fn test_missing_credentials_fail_before_loading() {
    let (tmp, config_path) = setup_test_env("gemini");
    let notes = tmp.path().join("notes.txt");
    fs::write(&notes, "Some notes.").unwrap();

    let (_stdout, stderr, success) = run_ra(&config_path, &["build", notes.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("missing GEMINI_API_KEY"));

    let (_stdout, stderr, success) = run_ra(&config_path, &["ask", "anything"]);
    assert!(!success);
    assert!(stderr.contains("configuration error"));
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("ra.toml");
    fs::write(&config_path, "[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap();

    let (_stdout, stderr, success) = run_ra(&config_path, &["status"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"));
}
