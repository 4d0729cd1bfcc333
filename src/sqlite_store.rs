//! SQLite-backed [`ChunkStore`].

use anyhow::Result;
use async_trait::async_trait;
use docassist_core::models::{DocumentLocation, TextRecord};
use docassist_core::store::ChunkStore;
use sqlx::{Row, SqlitePool};

use crate::index_store::IndexMeta;

/// Upper bound on bound parameters per `IN (...)` query.
const MAX_IDS_PER_QUERY: usize = 500;

/// Resolves vector ids of one index build to chunk text and location.
///
/// Ids from any other build, including an earlier build of the same model,
/// resolve to nothing.
#[derive(Clone)]
pub struct SqliteChunkStore {
    pool: SqlitePool,
    model_name: String,
    build_id: String,
}

impl SqliteChunkStore {
    pub fn new(
        pool: SqlitePool,
        model_name: impl Into<String>,
        build_id: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            model_name: model_name.into(),
            build_id: build_id.into(),
        }
    }

    /// The store for the build described by `meta`.
    pub fn for_index(pool: SqlitePool, meta: &IndexMeta) -> Self {
        Self::new(pool, meta.model_name.clone(), meta.build_id.clone())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn fetch_records(&self, ids: &[i64]) -> Result<Vec<TextRecord>> {
        let mut records = Vec::with_capacity(ids.len());

        for batch in ids.chunks(MAX_IDS_PER_QUERY) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "SELECT ce.vector_id, c.id AS chunk_id, c.page, c.text, d.source \
                 FROM chunk_embeddings ce \
                 JOIN chunks c ON c.id = ce.chunk_id \
                 JOIN documents d ON d.id = c.document_id \
                 WHERE ce.model_name = ? AND ce.build_id = ? AND ce.vector_id IN ({})",
                placeholders
            );

            let mut query = sqlx::query(&sql)
                .bind(&self.model_name)
                .bind(&self.build_id);
            for id in batch {
                query = query.bind(*id);
            }

            for row in query.fetch_all(&self.pool).await? {
                records.push(TextRecord {
                    record_id: row.get("vector_id"),
                    chunk_id: row.get("chunk_id"),
                    location: DocumentLocation::new(
                        row.get::<String, _>("source"),
                        row.get::<Option<i64>, _>("page"),
                    ),
                    text: row.get("text"),
                });
            }
        }

        tracing::debug!(requested = ids.len(), found = records.len(), "fetched chunk records");
        Ok(records)
    }
}
