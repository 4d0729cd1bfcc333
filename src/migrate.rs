use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // One row per ingested file version
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            doc_type TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            bytes INTEGER NOT NULL,
            ingested_at INTEGER NOT NULL,
            UNIQUE(source, sha256)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Page-level text windows
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            page INTEGER,
            char_start INTEGER NOT NULL,
            char_end INTEGER NOT NULL,
            text TEXT NOT NULL,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Maps a chunk to its row in one build of the on-disk vector index
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_embeddings (
            chunk_id INTEGER PRIMARY KEY,
            model_name TEXT NOT NULL,
            dims INTEGER NOT NULL,
            build_id TEXT NOT NULL DEFAULT '',
            vector_id INTEGER NOT NULL,
            UNIQUE(build_id, vector_id),
            FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Databases created before builds were tagged lack the column.
    let has_build_id: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('chunk_embeddings') WHERE name = 'build_id'",
    )
    .fetch_one(pool)
    .await?;
    if has_build_id == 0 {
        sqlx::query("ALTER TABLE chunk_embeddings ADD COLUMN build_id TEXT NOT NULL DEFAULT ''")
            .execute(pool)
            .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunk_embeddings_build ON chunk_embeddings(build_id, vector_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
