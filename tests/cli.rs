use std::fs;
use std::path::{Path, PathBuf};
use std::io::Write;
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn doco_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("doco");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("notes.txt"),
        "Quarterly notes.\n\nThe warehouse lease ends in March. Renewal talks start in January.",
    )
    .unwrap();
    fs::write(files_dir.join("long.txt"), "lorem ipsum ".repeat(100)).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/doco.sqlite"

[gemini]
api_key = "test-key"
base_url = "http://127.0.0.1:9"

[extraction]
provider = "local"

[embedding]
provider = "disabled"

[client]
state_path = "{root}/data/client_state.json"

[logging]
level = "warn"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("doco.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_doco(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = doco_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run doco binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn run_doco_with_stdin(config_path: &Path, args: &[&str], input: &str) -> (String, String, bool) {
    let binary = doco_binary();
    let mut child = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("Failed to run doco binary at {:?}: {}", binary, e));
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Two history entries: `b` (lease.pdf, with an answer) and `a` (scan.png).
fn write_history(tmp: &TempDir) -> PathBuf {
    let state_path = tmp.path().join("data/client_state.json");
    fs::create_dir_all(state_path.parent().unwrap()).unwrap();
    fs::write(
        &state_path,
        r#"{
  "documagic_history": [
    {"id": "b", "timestamp": 1700000100000, "fileName": "lease.pdf", "fileSize": 2048, "fileType": "pdf",
     "result": {"summary": "The lease ends in March.", "keyPoints": ["Renewal in January"], "actionItems": [], "tone": "Calm"}},
    {"id": "a", "timestamp": 1700000000000, "fileName": "scan.png", "fileSize": 10, "fileType": "image"}
  ],
  "theme": "dark"
}"#,
    )
    .unwrap();
    state_path
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("files")
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_doco(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/doco.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_doco(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_doco(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_dry_run_counts_chunks() {
    let (_tmp, config_path) = setup_test_env();
    let file = files_dir(&config_path).join("long.txt");

    let (stdout, stderr, success) =
        run_doco(&config_path, &["ingest", file.to_str().unwrap(), "--dry-run"]);
    assert!(success, "dry-run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("local extractor"));
    // 1200 characters at 500/50 -> windows at 0, 450, 900
    assert!(stdout.contains("characters: 1200"), "stdout={}", stdout);
    assert!(stdout.contains("chunks:     3"), "stdout={}", stdout);
}

#[test]
fn test_ingest_dry_run_unsupported_type() {
    let (_tmp, config_path) = setup_test_env();
    let file = files_dir(&config_path).join("notes.txt");

    let (_, stderr, success) = run_doco(
        &config_path,
        &[
            "ingest",
            file.to_str().unwrap(),
            "--mime",
            "image/png",
            "--dry-run",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("image/png"), "stderr={}", stderr);
}

#[test]
fn test_ingest_fails_when_embeddings_disabled() {
    let (tmp, config_path) = setup_test_env();
    let file = files_dir(&config_path).join("notes.txt");

    let (_, stderr, success) = run_doco(&config_path, &["ingest", file.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Oops! Something went wrong"), "stderr={}", stderr);

    // Nothing recorded for a failed upload.
    assert!(!tmp.path().join("data/client_state.json").exists());
}

#[test]
fn test_ingest_missing_file() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_doco(&config_path, &["ingest", "/nonexistent/file.pdf"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read file"));
}

#[test]
fn test_history_empty_then_clear() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_doco(&config_path, &["history", "list"]);
    assert!(success);
    assert!(stdout.contains("No history."));

    let (stdout, _, success) = run_doco(&config_path, &["history", "clear"]);
    assert!(success);
    assert!(stdout.contains("Cleared 0 history entries."));
}

#[test]
fn test_history_lists_recorded_entries() {
    let (tmp, config_path) = setup_test_env();
    let state_path = write_history(&tmp);

    let (stdout, stderr, success) = run_doco(&config_path, &["history", "list"]);
    assert!(success, "stderr={}", stderr);
    let lease = stdout.find("lease.pdf").unwrap();
    let scan = stdout.find("scan.png").unwrap();
    assert!(lease < scan, "newest entry should be listed first");
    assert!(stdout.contains("lease.pdf *"));

    let (stdout, _, _) = run_doco(&config_path, &["theme", "show"]);
    assert_eq!(stdout.trim(), "dark");

    let (_, _, success) = run_doco(&config_path, &["history", "clear"]);
    assert!(success);
    let saved = fs::read_to_string(&state_path).unwrap();
    assert!(saved.contains("\"documagic_history\": []"));
    assert!(saved.contains("\"theme\": \"dark\""));
}

#[test]
fn test_history_show_prints_stored_answer() {
    let (tmp, config_path) = setup_test_env();
    write_history(&tmp);

    let (stdout, stderr, success) = run_doco(&config_path, &["history", "show", "b"]);
    assert!(success, "stderr={}", stderr);
    assert!(stdout.contains("The lease ends in March."), "stdout={}", stdout);
    assert!(stdout.contains("  - Renewal in January"));
    assert!(stdout.contains("Tone: Calm"));

    let (stdout, _, success) = run_doco(&config_path, &["history", "show", "b", "--json"]);
    assert!(success);
    assert!(stdout.contains("\"keyPoints\""), "stdout={}", stdout);

    let (stdout, _, success) = run_doco(&config_path, &["history", "show", "a"]);
    assert!(success);
    assert!(stdout.contains("No answer stored for scan.png"), "stdout={}", stdout);

    let (_, stderr, success) = run_doco(&config_path, &["history", "show", "zzz"]);
    assert!(!success);
    assert!(stderr.contains("No history entry with id zzz"), "stderr={}", stderr);
}

#[test]
fn test_chat_failed_ingest_offers_retry_and_open() {
    let (tmp, config_path) = setup_test_env();
    write_history(&tmp);
    let file = files_dir(&config_path).join("notes.txt");

    let (stdout, stderr, success) = run_doco_with_stdin(
        &config_path,
        &["chat", file.to_str().unwrap()],
        "when does the lease end?\nretry\nopen zzz\nopen b\n\n",
    );
    assert!(success, "chat failed: stdout={}, stderr={}", stdout, stderr);

    // Initial analysis and the retry both fail without embeddings.
    assert_eq!(
        stderr.matches("Oops! Something went wrong").count(),
        2,
        "stderr={}",
        stderr
    );
    assert_eq!(stdout.matches("Type `retry` to try again").count(), 2);
    assert!(stdout.contains("No document is ready."), "stdout={}", stdout);
    assert!(stdout.contains("No history entry with id zzz"));
    assert!(stdout.contains("The lease ends in March."), "stdout={}", stdout);
}

#[test]
fn test_chat_reset_to_missing_file_keeps_prompt() {
    let (_tmp, config_path) = setup_test_env();
    let file = files_dir(&config_path).join("notes.txt");

    let (stdout, stderr, success) = run_doco_with_stdin(
        &config_path,
        &["chat", file.to_str().unwrap()],
        "reset /nonexistent/file.pdf\nreset\nquit\n",
    );
    assert!(success, "chat failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Failed to read file"), "stdout={}", stdout);
    assert!(stdout.contains("Usage: reset <file>"));
}

#[test]
fn test_corrupt_history_is_treated_as_empty() {
    let (tmp, config_path) = setup_test_env();
    let state_path = tmp.path().join("data/client_state.json");
    fs::create_dir_all(state_path.parent().unwrap()).unwrap();
    fs::write(
        &state_path,
        r#"{"documagic_history": "not a list", "theme": "dark"}"#,
    )
    .unwrap();

    let (stdout, stderr, success) = run_doco(&config_path, &["history", "list"]);
    assert!(success, "stderr={}", stderr);
    assert!(stdout.contains("No history."));

    let (stdout, _, _) = run_doco(&config_path, &["theme", "show"]);
    assert_eq!(stdout.trim(), "dark");
}

#[test]
fn test_theme_toggle_and_set() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_doco(&config_path, &["theme", "show"]);
    assert!(success);
    assert_eq!(stdout.trim(), "light");

    let (stdout, _, _) = run_doco(&config_path, &["theme", "toggle"]);
    assert_eq!(stdout.trim(), "dark");

    let (stdout, _, _) = run_doco(&config_path, &["theme", "show"]);
    assert_eq!(stdout.trim(), "dark");

    let (stdout, _, success) = run_doco(&config_path, &["theme", "set", "light"]);
    assert!(success);
    assert_eq!(stdout.trim(), "light");

    let (_, _, success) = run_doco(&config_path, &["theme", "set", "sepia"]);
    assert!(!success);
}

#[test]
fn test_stats_and_purge_on_empty_store() {
    let (_tmp, config_path) = setup_test_env();
    run_doco(&config_path, &["init"]);

    let (stdout, stderr, success) = run_doco(&config_path, &["stats"]);
    assert!(success, "stats failed: stderr={}", stderr);
    assert!(stdout.contains("Live:       0"));
    assert!(stdout.contains("TTL:        25 min"));

    let (stdout, _, success) = run_doco(&config_path, &["purge"]);
    assert!(success);
    assert!(stdout.contains("Purged 0 expired chunks."));
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env();
    let content = fs::read_to_string(&config_path).unwrap();
    fs::write(
        &config_path,
        format!("{}\n[chunking]\nsize = 100\noverlap = 100\n", content),
    )
    .unwrap();

    let (_, stderr, success) = run_doco(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("chunking.overlap"), "stderr={}", stderr);
}

#[test]
fn test_missing_config_rejected_for_store_commands() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("absent.toml");

    let (_, stderr, success) = run_doco(&missing, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("absent.toml"), "stderr={}", stderr);
}
