//! On-disk vector index: building, loading, and sharing.
//!
//! `build-index` embeds every chunk and writes two artifacts into
//! `[index].dir`:
//!
//! | File | Contents |
//! |------|----------|
//! | `index.bin` | row-major little-endian `f32`, one row per chunk |
//! | `meta.json` | `{ model_name, dims, num_vectors, built_at, build_id }` |
//!
//! Row `i` of `index.bin` is vector id `i`; the `chunk_embeddings` table
//! maps it back to a chunk. Every build gets a fresh `build_id`, recorded in
//! `meta.json` and on each mapping row, and [`SqliteChunkStore`] only resolves
//! ids of the build it was opened for. A bundle loaded before a rebuild
//! therefore finds no records instead of someone else's.
//!
//! The artifacts are staged as temp files, the mapping is committed, and only
//! then are the artifacts renamed into place.
//!
//! [`SqliteChunkStore`]: crate::sqlite_store::SqliteChunkStore
//!
//! At query time an [`IndexBundle`] (flat index + query embedder) is loaded
//! once and shared through [`SharedIndex`].

use anyhow::{bail, Context, Result};
use docassist_core::embedding::{blob_to_vec, vec_to_blob};
use docassist_core::index::{FlatIndex, VectorIndex};
use docassist_core::store::ChunkStore;
use docassist_core::Retriever;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::db;
use crate::embedding::ConfiguredEmbedder;

pub const INDEX_FILE: &str = "index.bin";
pub const META_FILE: &str = "meta.json";

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub model_name: String,
    pub dims: usize,
    pub num_vectors: usize,
    /// RFC 3339 build timestamp.
    pub built_at: String,
    /// Identifies this build's rows in `chunk_embeddings`. Empty for indexes
    /// written before builds were tagged.
    #[serde(default)]
    pub build_id: String,
}

/// Why an index could not be loaded.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index artifact not found: {} (run `docassist build-index`)", path.display())]
    Missing { path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("index is corrupt: {0}")]
    Corrupt(String),
    #[error(
        "index was built with {found_model} ({found_dims} dims) but the configured embedder is \
         {expected_model} ({expected_dims} dims); rebuild with `docassist build-index`"
    )]
    ModelMismatch {
        expected_model: String,
        expected_dims: usize,
        found_model: String,
        found_dims: usize,
    },
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, IndexError> {
    std::fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            IndexError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            IndexError::Unreadable {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// Read and check both artifacts, without an embedder.
pub fn read_index(dir: &Path) -> Result<(FlatIndex, IndexMeta), IndexError> {
    let meta_bytes = read_artifact(&dir.join(META_FILE))?;
    let meta: IndexMeta = serde_json::from_slice(&meta_bytes)
        .map_err(|e| IndexError::Corrupt(format!("{}: {}", META_FILE, e)))?;

    let data = read_artifact(&dir.join(INDEX_FILE))?;
    let expected_len = meta.num_vectors * meta.dims * 4;
    if data.len() != expected_len {
        return Err(IndexError::Corrupt(format!(
            "{} holds {} bytes, meta.json describes {} vectors x {} dims ({} bytes)",
            INDEX_FILE,
            data.len(),
            meta.num_vectors,
            meta.dims,
            expected_len
        )));
    }

    let index = FlatIndex::from_flat(meta.dims, blob_to_vec(&data))
        .map_err(|e| IndexError::Corrupt(e.to_string()))?;
    Ok((index, meta))
}

/// Read `meta.json` only. `Ok(None)` when no index has been built.
pub fn read_meta(dir: &Path) -> Result<Option<IndexMeta>, IndexError> {
    match read_artifact(&dir.join(META_FILE)) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| IndexError::Corrupt(format!("{}: {}", META_FILE, e))),
        Err(IndexError::Missing { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// The loaded index together with the embedder that must be used to query it.
pub struct IndexBundle {
    pub index: FlatIndex,
    pub embedder: ConfiguredEmbedder,
    pub meta: IndexMeta,
}

impl IndexBundle {
    /// Load the artifacts from `[index].dir` and check them against the
    /// configured embedder.
    ///
    /// Errors carry an [`IndexError`] that callers can downcast to.
    pub fn load(config: &Config) -> Result<Self> {
        let (index, meta) = read_index(&config.index.dir)?;
        let embedder = ConfiguredEmbedder::new(&config.embedding)?;

        if embedder.model_name() != meta.model_name || embedder.dims() != meta.dims {
            return Err(IndexError::ModelMismatch {
                expected_model: embedder.model_name().to_string(),
                expected_dims: embedder.dims(),
                found_model: meta.model_name.clone(),
                found_dims: meta.dims,
            }
            .into());
        }

        tracing::info!(
            model = %meta.model_name,
            dims = meta.dims,
            vectors = index.len(),
            dir = %config.index.dir.display(),
            "index loaded"
        );

        Ok(Self {
            index,
            embedder,
            meta,
        })
    }

    /// The retrieval engine over this bundle and `store`.
    pub fn retriever<'a>(&'a self, store: &'a dyn ChunkStore) -> Retriever<'a> {
        Retriever::new(&self.embedder, &self.index, store)
    }
}

/// Lazily loads the [`IndexBundle`] on first use.
///
/// Concurrent first callers wait on the same initialization. A failed load
/// is returned to the caller and retried on the next call.
pub struct SharedIndex {
    config: Arc<Config>,
    cell: OnceCell<Arc<IndexBundle>>,
}

impl SharedIndex {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<Arc<IndexBundle>> {
        let bundle = self
            .cell
            .get_or_try_init(|| async {
                let config = self.config.clone();
                let bundle = tokio::task::spawn_blocking(move || IndexBundle::load(&config))
                    .await
                    .context("index loader task failed")??;
                Ok::<_, anyhow::Error>(Arc::new(bundle))
            })
            .await?;
        Ok(bundle.clone())
    }

    /// The bundle if it has already been loaded.
    pub fn loaded(&self) -> Option<Arc<IndexBundle>> {
        self.cell.get().cloned()
    }
}

// ============ build-index ============

/// Run the `build-index` command.
pub async fn run_build_index(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let meta = build_index(&pool, config).await?;
    pool.close().await;

    println!("build-index");
    println!("  model: {} ({} dims)", meta.model_name, meta.dims);
    println!("  vectors: {}", meta.num_vectors);
    println!("  build: {}", meta.build_id);
    println!("  written to: {}", config.index.dir.display());
    println!("ok");
    Ok(())
}

/// Embed every chunk and write the index artifacts plus the id mapping.
pub async fn build_index(pool: &SqlitePool, config: &Config) -> Result<IndexMeta> {
    let embedder = ConfiguredEmbedder::new(&config.embedding)?;

    let rows = sqlx::query("SELECT id, text FROM chunks ORDER BY id")
        .fetch_all(pool)
        .await?;
    if rows.is_empty() {
        bail!("No chunks to index; run `docassist ingest <dir>` first");
    }

    let chunk_ids: Vec<i64> = rows.iter().map(|r| r.get("id")).collect();
    let texts: Vec<String> = rows.iter().map(|r| r.get("text")).collect();
    let total = texts.len();

    let mut index = FlatIndex::new(embedder.dims());
    for batch in texts.chunks(config.embedding.batch_size) {
        let vectors = embedder.embed_batch(batch).await?;
        for v in &vectors {
            index.add(v)?;
        }
        tracing::info!(done = index.len(), total, "embedded batch");
    }

    let meta = IndexMeta {
        model_name: embedder.model_name().to_string(),
        dims: embedder.dims(),
        num_vectors: index.len(),
        built_at: chrono::Utc::now().to_rfc3339(),
        build_id: uuid::Uuid::new_v4().to_string(),
    };

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM chunk_embeddings")
        .execute(&mut *tx)
        .await?;
    for (vector_id, chunk_id) in chunk_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO chunk_embeddings (chunk_id, model_name, dims, build_id, vector_id) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(chunk_id)
        .bind(&meta.model_name)
        .bind(meta.dims as i64)
        .bind(&meta.build_id)
        .bind(vector_id as i64)
        .execute(&mut *tx)
        .await?;
    }

    let staged = stage_artifacts(&config.index.dir, &index, &meta)?;
    if let Err(e) = tx.commit().await {
        staged.discard();
        return Err(e.into());
    }
    staged.publish()?;

    tracing::info!(
        model = %meta.model_name,
        build_id = %meta.build_id,
        vectors = meta.num_vectors,
        dir = %config.index.dir.display(),
        "index built"
    );
    Ok(meta)
}

/// Artifacts written to temp files beside their final paths, not yet
/// visible to readers.
struct StagedArtifacts {
    /// `(temp, final)` pairs, in publish order.
    files: Vec<(PathBuf, PathBuf)>,
}

impl StagedArtifacts {
    /// Rename `index.bin` then `meta.json` into place.
    fn publish(self) -> Result<()> {
        for (tmp, path) in &self.files {
            std::fs::rename(tmp, path)
                .with_context(|| format!("Failed to move {} into place", path.display()))?;
        }
        Ok(())
    }

    fn discard(self) {
        for (tmp, _) in &self.files {
            if let Err(e) = std::fs::remove_file(tmp) {
                tracing::warn!(path = %tmp.display(), error = %e, "failed to remove staged artifact");
            }
        }
    }
}

fn stage_artifacts(dir: &Path, index: &FlatIndex, meta: &IndexMeta) -> Result<StagedArtifacts> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create index directory {}", dir.display()))?;

    let contents = [
        (INDEX_FILE, vec_to_blob(index.as_slice())),
        (META_FILE, serde_json::to_vec_pretty(meta)?),
    ];
    let mut files = Vec::with_capacity(contents.len());
    for (name, bytes) in contents {
        let path = dir.join(name);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
        files.push((tmp, path));
    }
    Ok(StagedArtifacts { files })
}
