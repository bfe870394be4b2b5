use sqlx::SqlitePool;

use crate::error::Result;

/// Create the schema. Idempotent — safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Document versions. One row per (id, version); at most one row per id
    // has status 'open'. `seq` is the store change sequence assigned on
    // write and drives the incremental re-index cursor.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT NOT NULL,
            version INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            source_type TEXT NOT NULL,
            committee TEXT NOT NULL,
            case_number TEXT NOT NULL,
            published_at INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'open',
            body TEXT NOT NULL,
            body_hash TEXT NOT NULL,
            ingested_at INTEGER NOT NULL,
            PRIMARY KEY (id, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            UNIQUE(document_id, version, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Embeddings keyed by chunk, with the text hash they were computed
    // from so unchanged chunks skip the provider round-trip.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            chunk_id TEXT PRIMARY KEY,
            text_hash TEXT NOT NULL,
            dims INTEGER NOT NULL,
            vector BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Per-document pipeline progress; crash resume continues from the last
    // completed state instead of refetching.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_state (
            document_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            state TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (document_id, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Named cursors: 'feed' holds the opaque publication-feed cursor.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            name TEXT PRIMARY KEY,
            cursor TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Advisory enrichment facets with confidence; only rows marked
    // authoritative feed hard filtering.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enrichment (
            chunk_id TEXT NOT NULL,
            facet TEXT NOT NULL,
            value TEXT NOT NULL,
            confidence REAL NOT NULL,
            authoritative INTEGER NOT NULL,
            enricher TEXT NOT NULL,
            enricher_version INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (chunk_id, facet, value)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Closed facet vocabularies (committee, source type), grown on ingest.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS facet_vocab (
            facet TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (facet, value)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_seq ON documents(seq)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_case ON documents(case_number)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id, version)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_enrichment_chunk ON enrichment(chunk_id)")
        .execute(pool)
        .await?;

    Ok(())
}
