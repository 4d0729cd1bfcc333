//! In-process integration tests: SQLite chunk store + flat index + engine,
//! and the HTTP server running on a spawned task.
//!
//! All tests use the offline `hash` embedding provider, so no model
//! download or network access is needed.

use docassist::config::Config;
use docassist::index_store::{build_index, read_meta, IndexBundle, IndexError};
use docassist::ingest::ingest_dir;
use docassist::server::run_server;
use docassist::sqlite_store::SqliteChunkStore;
use docassist::{db, migrate};
use docassist_core::policy::AbstainReason;
use docassist_core::store::ChunkStore;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

const ALPHA: &str = "Refunds are issued within thirty days of purchase when the original receipt is provided.";
const BETA: &str = "The warranty covers manufacturing defects for two years from the delivery date.";
const GAMMA: &str = "Support tickets are answered by the operations team during business hours on weekdays.";

fn test_config(tmp: &TempDir, port: u16) -> Config {
    let root = tmp.path();
    let config_content = format!(
        r#"
[db]
path = "{root}/docassist.sqlite"

[index]
dir = "{root}/index"

[embedding]
provider = "hash"
dims = 256

[server]
bind = "127.0.0.1:{port}"
"#,
        root = root.display(),
        port = port
    );
    toml::from_str(&config_content).unwrap()
}

fn write_docs(tmp: &TempDir) -> std::path::PathBuf {
    let docs = tmp.path().join("docs");
    fs::create_dir_all(docs.join("policies")).unwrap();
    fs::write(docs.join("policies/refunds.md"), ALPHA).unwrap();
    fs::write(docs.join("warranty.txt"), BETA).unwrap();
    fs::write(docs.join("support.md"), GAMMA).unwrap();
    fs::write(docs.join("ignored.png"), b"not a document").unwrap();
    docs
}

/// Init, ingest, and build the index. Returns the config.
async fn prepared(tmp: &TempDir, port: u16) -> Config {
    let cfg = test_config(tmp, port);
    let docs = write_docs(tmp);
    migrate::run_migrations(&cfg).await.unwrap();
    let pool = db::connect(&cfg).await.unwrap();
    let summary = ingest_dir(&pool, &cfg.chunking, &docs).await.unwrap();
    assert_eq!(summary.files_ingested, 3);
    build_index(&pool, &cfg).await.unwrap();
    pool.close().await;
    cfg
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

// ─── Engine over SQLite ─────────────────────────────────────────────

#[tokio::test]
async fn test_exact_passage_is_cited_first() {
    let tmp = TempDir::new().unwrap();
    let cfg = prepared(&tmp, 0).await;

    let bundle = IndexBundle::load(&cfg).unwrap();
    assert_eq!(bundle.meta.num_vectors, 3);
    assert_eq!(bundle.meta.model_name, "feature-hash");

    let pool = db::connect(&cfg).await.unwrap();
    let store = SqliteChunkStore::for_index(pool, &bundle.meta);
    let params = cfg.retrieval.to_params();

    let result = bundle.retriever(&store).retrieve(ALPHA, &params).await.unwrap();
    assert!(!result.abstained);
    assert_eq!(result.reason, None);
    let top = &result.chunks[0];
    assert_eq!(top.location.source, "policies/refunds.md");
    assert_eq!(top.location.page, None);
    assert!(top.score.unwrap() > 0.99);
    assert!(result.chunks.len() <= params.max_citations);
}

#[tokio::test]
async fn test_unrelated_question_abstains() {
    let tmp = TempDir::new().unwrap();
    let cfg = prepared(&tmp, 0).await;

    let bundle = IndexBundle::load(&cfg).unwrap();
    let pool = db::connect(&cfg).await.unwrap();
    let store = SqliteChunkStore::for_index(pool, &bundle.meta);

    let mut params = cfg.retrieval.to_params();
    params.include_trace = true;
    let result = bundle
        .retriever(&store)
        .retrieve("volcano penguin saxophone", &params)
        .await
        .unwrap();

    assert!(result.abstained);
    assert!(result.chunks.is_empty());
    assert_eq!(result.reason, Some(AbstainReason::NoEvidenceLowTopScore));
    let trace = result.trace.unwrap();
    assert_eq!(trace.candidate_ids.len(), 3);
    assert_eq!(trace.records_fetched, 0);
}

#[tokio::test]
async fn test_repeat_query_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    let cfg = prepared(&tmp, 0).await;

    let bundle = IndexBundle::load(&cfg).unwrap();
    let pool = db::connect(&cfg).await.unwrap();
    let store = SqliteChunkStore::for_index(pool, &bundle.meta);
    let params = cfg.retrieval.to_params();

    let first = bundle.retriever(&store).retrieve(BETA, &params).await.unwrap();
    let second = bundle.retriever(&store).retrieve(BETA, &params).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_store_skips_unknown_ids_other_models_and_other_builds() {
    let tmp = TempDir::new().unwrap();
    let cfg = prepared(&tmp, 0).await;
    let meta = read_meta(&cfg.index.dir).unwrap().unwrap();
    assert!(!meta.build_id.is_empty());
    let pool = db::connect(&cfg).await.unwrap();

    let store = SqliteChunkStore::for_index(pool.clone(), &meta);
    let records = store.fetch_records(&[2, 0, 99]).await.unwrap();
    let mut ids: Vec<i64> = records.iter().map(|r| r.record_id).collect();
    ids.sort();
    assert_eq!(ids, vec![0, 2]);

    let other_model = SqliteChunkStore::new(pool.clone(), "some-other-model", meta.build_id.clone());
    assert!(other_model.fetch_records(&[0, 1, 2]).await.unwrap().is_empty());
    let other_build = SqliteChunkStore::new(pool, meta.model_name.clone(), "another-build");
    assert!(other_build.fetch_records(&[0, 1, 2]).await.unwrap().is_empty());
    assert!(store.fetch_records(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bundle_loaded_before_rebuild_resolves_no_records() {
    let tmp = TempDir::new().unwrap();
    let cfg = prepared(&tmp, 0).await;
    let old_bundle = IndexBundle::load(&cfg).unwrap();
    let pool = db::connect(&cfg).await.unwrap();
    let old_store = SqliteChunkStore::for_index(pool.clone(), &old_bundle.meta);

    let revised = "Refund requests are now handled through the billing portal.";
    fs::write(tmp.path().join("docs/policies/refunds.md"), revised).unwrap();
    let summary = ingest_dir(&pool, &cfg.chunking, &tmp.path().join("docs"))
        .await
        .unwrap();
    assert_eq!(summary.files_ingested, 1);
    let new_meta = build_index(&pool, &cfg).await.unwrap();
    assert_ne!(new_meta.build_id, old_bundle.meta.build_id);

    // The old vectors still score ALPHA perfectly, but their ids belong to
    // a build that no longer exists.
    let mut params = cfg.retrieval.to_params();
    params.include_trace = true;
    let result = old_bundle
        .retriever(&old_store)
        .retrieve(ALPHA, &params)
        .await
        .unwrap();
    assert!(result.abstained);
    assert!(result.chunks.is_empty());
    assert_eq!(result.reason, Some(AbstainReason::AllCandidatesFilteredByMinRowScore));
    let trace = result.trace.unwrap();
    assert!(trace.summary.top1.unwrap() > 0.99);
    assert_eq!(trace.records_fetched, 0);

    let new_bundle = IndexBundle::load(&cfg).unwrap();
    let new_store = SqliteChunkStore::for_index(pool, &new_bundle.meta);
    let result = new_bundle
        .retriever(&new_store)
        .retrieve(revised, &params)
        .await
        .unwrap();
    assert!(!result.abstained);
    assert_eq!(result.chunks[0].location.source, "policies/refunds.md");
    assert_eq!(result.chunks[0].text, revised);
}

#[tokio::test]
async fn test_reingest_unchanged_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let cfg = prepared(&tmp, 0).await;
    let pool = db::connect(&cfg).await.unwrap();

    let summary = ingest_dir(&pool, &cfg.chunking, &tmp.path().join("docs"))
        .await
        .unwrap();
    assert_eq!(summary.files_seen, 3);
    assert_eq!(summary.files_unchanged, 3);
    assert_eq!(summary.chunks_written, 0);

    let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(chunks, 3);
}

#[tokio::test]
async fn test_changed_file_replaces_previous_version() {
    let tmp = TempDir::new().unwrap();
    let cfg = prepared(&tmp, 0).await;
    let pool = db::connect(&cfg).await.unwrap();

    fs::write(tmp.path().join("docs/warranty.txt"), "Warranty terms changed.").unwrap();
    let summary = ingest_dir(&pool, &cfg.chunking, &tmp.path().join("docs"))
        .await
        .unwrap();
    assert_eq!(summary.files_ingested, 1);

    let docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE source = 'warranty.txt'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(docs, 1);
    let text: String = sqlx::query_scalar(
        "SELECT c.text FROM chunks c JOIN documents d ON d.id = c.document_id \
         WHERE d.source = 'warranty.txt'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(text, "Warranty terms changed.");
}

#[tokio::test]
async fn test_load_fails_fast_on_model_mismatch() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = prepared(&tmp, 0).await;
    cfg.embedding.dims = Some(128);

    let err = IndexBundle::load(&cfg).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<IndexError>(),
        Some(IndexError::ModelMismatch { found_dims: 256, expected_dims: 128, .. })
    ));
}

#[tokio::test]
async fn test_load_without_index_is_missing() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, 0);
    let err = IndexBundle::load(&cfg).err().unwrap();
    assert!(matches!(err.downcast_ref::<IndexError>(), Some(IndexError::Missing { .. })));
}

#[tokio::test]
async fn test_build_index_refuses_empty_store() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, 0);
    migrate::run_migrations(&cfg).await.unwrap();
    let pool = db::connect(&cfg).await.unwrap();
    let err = build_index(&pool, &cfg).await.unwrap_err();
    assert!(err.to_string().contains("No chunks to index"));
}

// ─── HTTP server ────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_health_and_ask() {
    let tmp = TempDir::new().unwrap();
    let port = find_free_port();
    let cfg = prepared(&tmp, port).await;

    let server_cfg = cfg.clone();
    let server_handle = tokio::spawn(async move {
        run_server(&server_cfg).await.ok();
    });
    wait_for_server(port).await;

    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["index"]["num_vectors"], 3);
    assert_eq!(health["index"]["dims"], 256);

    let resp = client
        .post(format!("{}/ask", base))
        .header("x-request-id", "req-123")
        .json(&json!({ "question": ALPHA }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-request-id"], "req-123");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["request_id"], "req-123");
    assert_eq!(body["abstained"], false);
    assert_eq!(body["cost_usd"], 0.0);
    assert_eq!(body["citations"][0]["source"], "policies/refunds.md");
    assert!(body["answer"].as_str().unwrap().contains("- Refunds are issued"));
    assert!(body["debug"].is_null());

    let body: Value = client
        .post(format!("{}/ask", base))
        .json(&json!({ "question": "volcano penguin saxophone" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["abstained"], true);
    assert_eq!(body["reason"], "no_evidence_low_top_score");
    assert_eq!(body["citations"].as_array().unwrap().len(), 0);
    assert!(!body["request_id"].as_str().unwrap().is_empty());

    server_handle.abort();
}

#[tokio::test]
async fn test_server_rejects_bad_questions() {
    let tmp = TempDir::new().unwrap();
    let port = find_free_port();
    let cfg = prepared(&tmp, port).await;

    let server_cfg = cfg.clone();
    let server_handle = tokio::spawn(async move {
        run_server(&server_cfg).await.ok();
    });
    wait_for_server(port).await;

    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/ask", port);

    let too_long = "x".repeat(4001);
    for question in ["", "   ", too_long.as_str()] {
        let resp = client
            .post(&url)
            .json(&json!({ "question": question }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "question {:?}", question);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "bad_request");
    }

    let resp = client
        .post(&url)
        .json(&json!({ "q": "missing field" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    server_handle.abort();
}
