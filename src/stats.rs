//! Database and index statistics.
//!
//! A quick health overview of what's ingested and indexed: document counts
//! by status, chunk and embedding coverage, per-committee breakdowns, and
//! cursor positions. Used by `dgs stats` to confirm syncs and embeddings
//! are keeping up.

use sqlx::Row;

use crate::config::Config;
use crate::error::Result;
use crate::lexical::LexicalIndex;
use crate::store::DocumentStore;
use crate::vector::VectorIndex;

struct CommitteeStats {
    committee: String,
    doc_count: i64,
    chunk_count: i64,
    embedded_count: i64,
}

/// Query the store and indexes and print a summary.
pub async fn run_stats(
    config: &Config,
    store: &DocumentStore,
    lexical: &LexicalIndex,
    vector: &VectorIndex,
) -> Result<()> {
    let pool = store.pool();

    let open_docs: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE status = 'open'")
            .fetch_one(pool)
            .await?;
    let superseded_docs: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE status = 'superseded'")
            .fetch_one(pool)
            .await?;
    let failed_docs: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pipeline_state WHERE state = 'failed'")
            .fetch_one(pool)
            .await?;

    let total_chunks = store.count_chunks().await?;
    let embedded_chunks = store.count_embedded_chunks().await?;

    let db_size = std::fs::metadata(&config.store.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("dagsorden — store and index stats");
    println!("=================================");
    println!();
    println!("  Database:      {}", config.store.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Open docs:     {}", open_docs);
    println!("  Superseded:    {}", superseded_docs);
    println!("  Failed:        {}", failed_docs);
    println!("  Chunks:        {}", total_chunks);
    println!(
        "  Embedded:      {} / {} ({}%)",
        embedded_chunks,
        total_chunks,
        if total_chunks > 0 {
            (embedded_chunks * 100) / total_chunks
        } else {
            0
        }
    );
    println!();
    println!(
        "  Lexical index: {} chunks (generation {})",
        lexical.len(),
        lexical.generation()
    );
    println!(
        "  Vector index:  {} embeddings (generation {})",
        vector.len(),
        vector.generation()
    );

    if let Some(cursor) = store.checkpoint("feed").await? {
        println!();
        println!("  Feed cursor:   {}", cursor);
    }

    // Per-committee breakdown over open documents.
    let committee_rows = sqlx::query(
        r#"
        SELECT
            d.committee,
            COUNT(DISTINCT d.id) AS doc_count,
            COUNT(DISTINCT c.id) AS chunk_count,
            COUNT(DISTINCT e.chunk_id) AS embedded_count
        FROM documents d
        LEFT JOIN chunks c ON c.document_id = d.id AND c.version = d.version
        LEFT JOIN embeddings e ON e.chunk_id = c.id AND e.text_hash = c.hash
        WHERE d.status = 'open'
        GROUP BY d.committee
        ORDER BY doc_count DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let committee_stats: Vec<CommitteeStats> = committee_rows
        .iter()
        .map(|row| CommitteeStats {
            committee: row.get("committee"),
            doc_count: row.get("doc_count"),
            chunk_count: row.get("chunk_count"),
            embedded_count: row.get("embedded_count"),
        })
        .collect();

    if !committee_stats.is_empty() {
        println!();
        println!("  By committee:");
        println!(
            "  {:<28} {:>6} {:>8} {:>10}",
            "COMMITTEE", "DOCS", "CHUNKS", "EMBEDDED"
        );
        println!("  {}", "-".repeat(56));

        for s in &committee_stats {
            println!(
                "  {:<28} {:>6} {:>8} {:>10}",
                s.committee, s.doc_count, s.chunk_count, s.embedded_count
            );
        }
    }

    println!();
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
