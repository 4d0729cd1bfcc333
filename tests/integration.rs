use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const REFUNDS: &str =
    "Refunds are issued within thirty days of purchase when the original receipt is provided.";

fn docassist_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docassist");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(files_dir.join("refunds.md"), REFUNDS).unwrap();
    fs::write(
        files_dir.join("warranty.txt"),
        "The warranty covers manufacturing defects for two years from the delivery date.",
    )
    .unwrap();
    fs::write(
        files_dir.join("support.md"),
        "Support tickets are answered by the operations team during business hours on weekdays.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/docassist.sqlite"

[index]
dir = "{root}/data/index"

[embedding]
provider = "hash"
dims = 256

[logging]
level = "warn"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("docassist.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docassist(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docassist_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docassist binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// init + ingest + build-index.
fn indexed_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let files = tmp.path().join("files");

    let (_, stderr, ok) = run_docassist(&config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    let (_, stderr, ok) = run_docassist(&config_path, &["ingest", files.to_str().unwrap()]);
    assert!(ok, "ingest failed: {}", stderr);
    let (stdout, stderr, ok) = run_docassist(&config_path, &["build-index"]);
    assert!(ok, "build-index failed: stdout={}, stderr={}", stdout, stderr);

    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docassist(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/docassist.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_docassist(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_docassist(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_then_reingest() {
    let (tmp, config_path) = setup_test_env();
    let files = tmp.path().join("files");
    run_docassist(&config_path, &["init"]);

    let (stdout, stderr, success) =
        run_docassist(&config_path, &["ingest", files.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files ingested: 3"));
    assert!(stdout.contains("chunks written: 3"));
    assert!(stdout.contains("ok"));

    let (stdout, _, success) = run_docassist(&config_path, &["ingest", files.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("files unchanged: 3"));
    assert!(stdout.contains("chunks written: 0"));
}

#[test]
fn test_ingest_missing_dir_errors() {
    let (tmp, config_path) = setup_test_env();
    run_docassist(&config_path, &["init"]);
    let missing = tmp.path().join("nope");
    let (_, stderr, success) = run_docassist(&config_path, &["ingest", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("does not exist"));
}

#[test]
fn test_build_index_reports_vectors() {
    let (tmp, config_path) = indexed_env();
    let (stdout, _, success) = run_docassist(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   3"));
    assert!(stdout.contains("Vectors:     3"));
    assert!(tmp.path().join("data/index/index.bin").exists());
    assert!(tmp.path().join("data/index/meta.json").exists());
}

#[test]
fn test_ask_cites_matching_passage() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, stderr, success) = run_docassist(&config_path, &["ask", REFUNDS]);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.starts_with("#1 score="));
    assert!(stdout.contains("refunds.md"));
    assert!(!stdout.contains("NO EVIDENCE"));
}

#[test]
fn test_ask_unrelated_abstains() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, _, success) = run_docassist(&config_path, &["ask", "volcano penguin saxophone"]);
    assert!(success);
    assert!(stdout.contains("NO EVIDENCE (no_evidence_low_top_score)"));
}

#[test]
fn test_ask_json_with_trace() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, _, success) = run_docassist(&config_path, &["ask", REFUNDS, "--json", "--trace"]);
    assert!(success);
    let body: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["abstained"], false);
    assert_eq!(body["citations"][0]["source"], "refunds.md");
    assert_eq!(body["debug"]["outcome"], "answered");
    assert_eq!(body["debug"]["model"], "feature-hash");
}

#[test]
fn test_ask_empty_question_errors() {
    let (_tmp, config_path) = indexed_env();
    let (_, stderr, success) = run_docassist(&config_path, &["ask", "   "]);
    assert!(!success);
    assert!(stderr.contains("empty"));
}

#[test]
fn test_ask_without_index_errors() {
    let (_tmp, config_path) = setup_test_env();
    run_docassist(&config_path, &["init"]);
    let (_, stderr, success) = run_docassist(&config_path, &["ask", "anything"]);
    assert!(!success);
    assert!(stderr.contains("build-index"));
}

#[test]
fn test_eval_writes_report() {
    let (tmp, config_path) = indexed_env();
    let data = tmp.path().join("gold.jsonl");
    let out = tmp.path().join("reports/report.json");
    fs::write(
        &data,
        format!(
            "{{\"query\": \"{}\", \"expected\": [{{\"source\": \"docs/REFUNDS.md\", \"page\": null}}]}}\n\
             {{\"query\": \"volcano penguin saxophone\", \"expected\": []}}\n",
            REFUNDS
        ),
    )
    .unwrap();

    let (stdout, stderr, success) = run_docassist(
        &config_path,
        &[
            "eval",
            "--data",
            data.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
            "--fail-under",
            "0.5",
        ],
    );
    assert!(success, "eval failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("recall@5: 1.000"));

    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(report["cases_total"], 2);
    assert_eq!(report["recall_at_k"], 1.0);
    assert_eq!(report["no_evidence_accuracy"], 1.0);
    assert_eq!(report["false_evidence_rate"], 0.0);
}

#[test]
fn test_eval_fail_under_exits_nonzero() {
    let (tmp, config_path) = indexed_env();
    let data = tmp.path().join("gold.jsonl");
    let out = tmp.path().join("report.json");
    fs::write(
        &data,
        "{\"query\": \"volcano penguin saxophone\", \"expected\": [{\"source\": \"missing.pdf\", \"page\": 4}]}\n",
    )
    .unwrap();

    let (stdout, _, success) = run_docassist(
        &config_path,
        &[
            "eval",
            "--data",
            data.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
            "--fail-under",
            "0.5",
        ],
    );
    assert!(!success);
    assert!(stdout.contains("FAIL: Recall@5"));
    assert!(out.exists());
}
