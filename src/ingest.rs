//! Ingestion pipeline: directory walk → extraction → chunking → storage.
//!
//! Files are identified by their path relative to the ingested directory
//! plus a SHA-256 of their bytes. An unchanged file is skipped; a changed
//! file replaces the previous version of the same source, chunks included.
//! The vector index is not touched here; run `build-index` afterwards.

use anyhow::{bail, Context, Result};
use docassist_core::chunk::chunk_page;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{ChunkingConfig, Config};
use crate::db;
use crate::extract::{extract_pages, DocType};

/// Counts reported by [`ingest_dir`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub files_seen: usize,
    pub files_ingested: usize,
    pub files_unchanged: usize,
    pub files_failed: usize,
    pub chunks_written: usize,
}

pub async fn run_ingest(config: &Config, dir: &Path) -> Result<()> {
    let pool = db::connect(config).await?;
    let summary = ingest_dir(&pool, &config.chunking, dir).await?;

    println!("ingest {}", dir.display());
    println!("  files found: {}", summary.files_seen);
    println!("  files ingested: {}", summary.files_ingested);
    println!("  files unchanged: {}", summary.files_unchanged);
    println!("  files failed: {}", summary.files_failed);
    println!("  chunks written: {}", summary.chunks_written);
    if summary.files_ingested > 0 {
        println!("  index is stale; run `docassist build-index`");
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Ingest every supported file under `dir`.
pub async fn ingest_dir(
    pool: &SqlitePool,
    chunking: &ChunkingConfig,
    dir: &Path,
) -> Result<IngestSummary> {
    if !dir.is_dir() {
        bail!("Documents directory does not exist: {}", dir.display());
    }

    let files = scan_dir(dir)?;
    let mut summary = IngestSummary {
        files_seen: files.len(),
        ..IngestSummary::default()
    };

    for (path, doc_type) in files {
        let source = path
            .strip_prefix(dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let digest = hex::encode(Sha256::digest(&bytes));

        if document_exists(pool, &source, &digest).await? {
            tracing::debug!(%source, "unchanged, skipping");
            summary.files_unchanged += 1;
            continue;
        }

        let pages = match extract_pages(&bytes, doc_type) {
            Ok(pages) => pages,
            Err(e) => {
                tracing::warn!(%source, error = %e, "extraction failed, skipping file");
                summary.files_failed += 1;
                continue;
            }
        };

        let chunks: Vec<_> = pages
            .iter()
            .flat_map(|p| chunk_page(p.page, &p.text, chunking.chunk_chars, chunking.overlap_chars))
            .collect();

        let mut tx = pool.begin().await?;

        // Replaces any earlier version of this source; chunks cascade.
        sqlx::query("DELETE FROM documents WHERE source = ?")
            .bind(&source)
            .execute(&mut *tx)
            .await?;

        let doc_id: i64 = sqlx::query_scalar(
            "INSERT INTO documents (source, doc_type, sha256, bytes, ingested_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&source)
        .bind(doc_type.as_str())
        .bind(&digest)
        .bind(bytes.len() as i64)
        .bind(chrono::Utc::now().timestamp())
        .fetch_one(&mut *tx)
        .await?;

        for (chunk_index, chunk) in chunks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO chunks (document_id, chunk_index, page, char_start, char_end, text) \
                 VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(document_id, chunk_index) DO NOTHING",
            )
            .bind(doc_id)
            .bind(chunk_index as i64)
            .bind(chunk.page)
            .bind(chunk.char_start as i64)
            .bind(chunk.char_end as i64)
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(%source, doc_type = doc_type.as_str(), chunks = chunks.len(), "ingested");
        summary.files_ingested += 1;
        summary.chunks_written += chunks.len();
    }

    Ok(summary)
}

/// Supported files under `dir`, sorted by path for deterministic ids.
fn scan_dir(dir: &Path) -> Result<Vec<(PathBuf, DocType)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(doc_type) = DocType::from_path(entry.path()) {
            files.push((entry.into_path(), doc_type));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

async fn document_exists(pool: &SqlitePool, source: &str, sha256: &str) -> Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT id FROM documents WHERE source = ? AND sha256 = ?")
            .bind(source)
            .bind(sha256)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}
