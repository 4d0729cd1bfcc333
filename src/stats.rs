//! Database and index overview for `docassist stats`.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::index_store::read_meta;

/// Per-source breakdown of chunk and embedding counts.
struct SourceStats {
    source: String,
    doc_type: String,
    chunk_count: i64,
    indexed_count: i64,
    pages: Option<i64>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;
    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;
    let total_indexed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_embeddings")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("docassist stats");
    println!("===============");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", total_docs);
    println!("  Chunks:      {}", total_chunks);
    println!(
        "  Indexed:     {} / {} ({}%)",
        total_indexed,
        total_chunks,
        if total_chunks > 0 {
            (total_indexed * 100) / total_chunks
        } else {
            0
        }
    );

    println!();
    match read_meta(&config.index.dir) {
        Ok(Some(meta)) => {
            println!("  Index:       {}", config.index.dir.display());
            println!("  Model:       {} ({} dims)", meta.model_name, meta.dims);
            println!("  Vectors:     {}", meta.num_vectors);
            println!("  Built at:    {}", meta.built_at);
            if meta.num_vectors as i64 != total_chunks {
                println!("  (index is stale; run `docassist build-index`)");
            }
        }
        Ok(None) => println!("  Index:       not built"),
        Err(e) => println!("  Index:       unreadable ({})", e),
    }

    let source_rows = sqlx::query(
        r#"
        SELECT
            d.source,
            d.doc_type,
            COUNT(c.id) AS chunk_count,
            COUNT(ce.chunk_id) AS indexed_count,
            MAX(c.page) AS pages
        FROM documents d
        LEFT JOIN chunks c ON c.document_id = d.id
        LEFT JOIN chunk_embeddings ce ON ce.chunk_id = c.id
        GROUP BY d.id
        ORDER BY d.source
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let source_stats: Vec<SourceStats> = source_rows
        .iter()
        .map(|row| SourceStats {
            source: row.get("source"),
            doc_type: row.get("doc_type"),
            chunk_count: row.get("chunk_count"),
            indexed_count: row.get("indexed_count"),
            pages: row.get("pages"),
        })
        .collect();

    if !source_stats.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<40} {:>4} {:>6} {:>8} {:>8}",
            "SOURCE", "TYPE", "PAGES", "CHUNKS", "INDEXED"
        );
        println!("  {}", "-".repeat(70));

        for s in &source_stats {
            let pages = s
                .pages
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<40} {:>4} {:>6} {:>8} {:>8}",
                s.source, s.doc_type, pages, s.chunk_count, s.indexed_count
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
