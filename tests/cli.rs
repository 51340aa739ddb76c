//! End-to-end tests driving the `docsage` binary.
//!
//! Each test gets its own temporary workspace with a config file, a SQLite
//! database and the hashing embedder, so nothing touches the network.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docsage_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docsage"))
}

fn setup_workspace() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    let docs = root.join("docs");
    fs::create_dir_all(docs.join("nested")).unwrap();
    fs::create_dir_all(docs.join(".hidden")).unwrap();
    fs::write(
        docs.join("lyon.md"),
        "# Logistics\n\nThe warehouse in Lyon ships customer orders every Tuesday and Friday.\n",
    )
    .unwrap();
    fs::write(
        docs.join("nested/revenue.txt"),
        "Quarterly revenue grew twelve percent, driven by subscriptions in Northern Europe.",
    )
    .unwrap();
    fs::write(
        docs.join("nested/staff.csv"),
        "name,team\nAda,platform\nGrace,compilers\n",
    )
    .unwrap();
    fs::write(docs.join(".hidden/secret.txt"), "should never be ingested").unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("docsage.toml");
    fs::write(
        &config_path,
        format!(
            r#"[db]
path = '{}'

[embedding]
provider = "hashing"
dims = 64

[ocr]
binary = "docsage-test-no-such-tesseract"
"#,
            root.join("data").join("docsage.sqlite").display()
        ),
    )
    .unwrap();

    (tmp, config_path)
}

fn run_docsage(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(docsage_binary())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run docsage binary");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

/// Ingest a single file and return its document id.
fn ingest_one(config_path: &Path, file: &Path) -> String {
    let (stdout, stderr, ok) = run_docsage(config_path, &["ingest", file.to_str().unwrap()]);
    assert!(ok, "ingest failed: {}", stderr);
    stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("id: "))
        .expect("no id in ingest output")
        .to_string()
}

#[test]
fn test_init_is_idempotent() {
    let (tmp, config) = setup_workspace();
    for _ in 0..2 {
        let (stdout, stderr, ok) = run_docsage(&config, &["init"]);
        assert!(ok, "init failed: {}", stderr);
        assert!(stdout.contains("Database initialized"));
    }
    assert!(tmp.path().join("data/docsage.sqlite").exists());
}

#[test]
fn test_ingest_directory_then_list() {
    let (tmp, config) = setup_workspace();
    run_docsage(&config, &["init"]);

    let docs = tmp.path().join("docs");
    let (stdout, stderr, ok) = run_docsage(&config, &["ingest", docs.to_str().unwrap()]);
    assert!(ok, "ingest failed: {}", stderr);
    assert!(stdout.contains("3 of 3 files ingested"), "stdout: {}", stdout);
    assert!(!stdout.contains("secret.txt"));

    let (stdout, _, ok) = run_docsage(&config, &["list"]);
    assert!(ok);
    assert!(stdout.contains("lyon.md"));
    assert!(stdout.contains("revenue.txt"));
    assert!(stdout.contains("staff.csv"));
    assert_eq!(stdout.lines().count(), 3);
}

#[test]
fn test_query_answers_from_persisted_index() {
    let (tmp, config) = setup_workspace();
    let docs = tmp.path().join("docs");
    let (_, stderr, ok) = run_docsage(&config, &["ingest", docs.to_str().unwrap()]);
    assert!(ok, "ingest failed: {}", stderr);

    // A fresh process warms the index from SQLite.
    let (stdout, stderr, ok) = run_docsage(
        &config,
        &["query", "When does the Lyon warehouse ship orders?", "--show-evidence"],
    );
    assert!(ok, "query failed: {}", stderr);
    assert!(stdout.contains("Extracted passage from \"lyon.md\""), "stdout: {}", stdout);
    assert!(stdout.contains("Source: lyon.md"));
    assert!(stdout.contains("Evidence:"));
    assert!(stdout.contains("score="));
}

#[test]
fn test_query_on_empty_corpus_fails() {
    let (_tmp, config) = setup_workspace();
    let (_, stderr, ok) = run_docsage(&config, &["query", "anything"]);
    assert!(!ok);
    assert!(stderr.contains("no chunks available"), "stderr: {}", stderr);
}

#[test]
fn test_query_unknown_document_fails() {
    let (tmp, config) = setup_workspace();
    ingest_one(&config, &tmp.path().join("docs/lyon.md"));
    let (_, stderr, ok) = run_docsage(&config, &["query", "Lyon", "--doc", "no-such-id"]);
    assert!(!ok);
    assert!(stderr.contains("document not found: no-such-id"), "stderr: {}", stderr);
}

#[test]
fn test_summarize_get_and_delete() {
    let (tmp, config) = setup_workspace();
    let id = ingest_one(&config, &tmp.path().join("docs/nested/revenue.txt"));

    let (stdout, stderr, ok) = run_docsage(&config, &["summarize", &id]);
    assert!(ok, "summarize failed: {}", stderr);
    assert!(stdout.contains("Summary of revenue.txt (extractive)"));
    assert!(stdout.contains("Quarterly revenue grew twelve percent"));

    let (stdout, _, ok) = run_docsage(&config, &["summarize", &id]);
    assert!(ok);
    assert!(stdout.contains("(cached)"));

    let (stdout, _, ok) = run_docsage(&config, &["get", &id]);
    assert!(ok);
    assert!(stdout.contains("filename:     revenue.txt"));
    assert!(stdout.contains("content_type: text/plain"));
    assert!(stdout.contains("summary:"));

    let (stdout, _, ok) = run_docsage(&config, &["delete", &id]);
    assert!(ok);
    assert!(stdout.contains(&format!("Deleted {}", id)));

    let (_, stderr, ok) = run_docsage(&config, &["get", &id]);
    assert!(!ok);
    assert!(stderr.contains("document not found"));
}

#[test]
fn test_reindex_all() {
    let (tmp, config) = setup_workspace();
    ingest_one(&config, &tmp.path().join("docs/lyon.md"));
    let (stdout, stderr, ok) = run_docsage(&config, &["reindex"]);
    assert!(ok, "reindex failed: {}", stderr);
    assert!(stdout.contains("1 document(s) reindexed"));
}

#[test]
fn test_unsupported_file_exits_nonzero() {
    let (tmp, config) = setup_workspace();
    let blob = tmp.path().join("blob.xyz");
    fs::write(&blob, [0u8, 0x13, 0x37, 0x42, 0x00]).unwrap();

    let (stdout, stderr, ok) = run_docsage(&config, &["ingest", blob.to_str().unwrap()]);
    assert!(!ok);
    assert!(stdout.contains("0 of 1 files ingested"));
    assert!(stderr.contains("unsupported format: blob.xyz"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_docsage(&tmp.path().join("nope.toml"), &["list"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"));
}
