//! Versioned document store backed by SQLite.
//!
//! The store is the single source of truth: both indexes are derived
//! caches rebuildable from it. Writes are transactional over a WAL
//! journal, so no partial document is ever visible to readers. Every
//! accepted write is assigned a monotonically increasing sequence number
//! (`seq`); [`DocumentStore::documents_after`] pages over that sequence
//! and is the change cursor used for incremental re-indexing.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{Chunk, DocStatus, Document, SourceDocument, SourceType};

/// Outcome of a [`DocumentStore::put_document`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// A new version was accepted and assigned this sequence number.
    Inserted { seq: i64 },
    /// The (id, version) pair already exists; nothing changed.
    Unchanged,
}

/// An advisory enrichment facet row.
#[derive(Debug, Clone)]
pub struct EnrichmentRow {
    pub chunk_id: String,
    pub facet: String,
    pub value: String,
    pub confidence: f32,
    pub authoritative: bool,
    pub enricher: String,
    pub enricher_version: u32,
}

#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Idempotent upsert keyed by (id, version).
    ///
    /// Re-putting an existing (id, version) is a no-op. Submitting a
    /// version lower than the current open one fails with
    /// [`Error::Conflict`] and leaves the higher version current. A higher
    /// version supersedes all prior open versions in the same transaction.
    pub async fn put_document(&self, doc: &SourceDocument) -> Result<PutOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing: Vec<(i64, String)> =
            sqlx::query_as("SELECT version, status FROM documents WHERE id = ?")
                .bind(&doc.id)
                .fetch_all(&mut *tx)
                .await?;

        if existing.iter().any(|(v, _)| *v == doc.version as i64) {
            return Ok(PutOutcome::Unchanged);
        }

        if let Some((open_version, _)) = existing.iter().find(|(_, s)| s == "open") {
            if (doc.version as i64) < *open_version {
                return Err(Error::Conflict {
                    id: doc.id.clone(),
                    submitted: doc.version,
                    current: *open_version as u64,
                });
            }
        }

        let seq: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) + 1 FROM documents")
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE documents SET status = 'superseded' WHERE id = ? AND status = 'open'")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await?;

        let body_hash = hash_text(&doc.body);

        sqlx::query(
            r#"
            INSERT INTO documents
                (id, version, seq, source_type, committee, case_number, published_at, status, body, body_hash, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'open', ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(doc.version as i64)
        .bind(seq)
        .bind(doc.source_type.as_str())
        .bind(&doc.committee)
        .bind(&doc.case_number)
        .bind(doc.published_at.timestamp())
        .bind(&doc.body)
        .bind(&body_hash)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        // Grow the closed facet vocabularies as new values appear.
        sqlx::query("INSERT OR IGNORE INTO facet_vocab (facet, value) VALUES ('committee', ?)")
            .bind(&doc.committee)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO facet_vocab (facet, value) VALUES ('source_type', ?)")
            .bind(doc.source_type.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(PutOutcome::Inserted { seq })
    }

    /// The open version of a document, or [`Error::NotFound`].
    pub async fn get_current(&self, id: &str) -> Result<Document> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ? AND status = 'open'")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_document(&row),
            None => Err(Error::NotFound(format!("document {id}"))),
        }
    }

    /// A specific version of a document, or [`Error::NotFound`].
    pub async fn get_version(&self, id: &str, version: u64) -> Result<Document> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ? AND version = ?")
            .bind(id)
            .bind(version as i64)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_document(&row),
            None => Err(Error::NotFound(format!("document {id} v{version}"))),
        }
    }

    /// One page of document versions written after `cursor`, ordered by
    /// sequence. Restartable: re-calling with the same cursor re-yields
    /// the same page.
    pub async fn documents_after(&self, cursor: i64, limit: usize) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE seq > ? ORDER BY seq LIMIT ?")
            .bind(cursor)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_document).collect()
    }

    /// Highest assigned sequence number (0 for an empty store).
    pub async fn max_seq(&self) -> Result<i64> {
        let seq: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(seq)
    }

    /// All open documents for a case, newest publication first.
    pub async fn case_history(&self, case_number: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE case_number = ? AND status = 'open' ORDER BY published_at DESC, id ASC",
        )
        .bind(case_number)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }

    pub async fn replace_chunks(
        &self,
        document_id: &str,
        version: u64,
        chunks: &[Chunk],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ? AND version = ?")
            .bind(document_id)
            .bind(version as i64)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, version, chunk_index, start_offset, end_offset, text, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.version as i64)
            .bind(chunk.chunk_index)
            .bind(chunk.start_offset)
            .bind(chunk.end_offset)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn chunks_for(&self, document_id: &str, version: u64) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT * FROM chunks WHERE document_id = ? AND version = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .bind(version as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_chunk).collect()
    }

    pub async fn chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let row = sqlx::query("SELECT * FROM chunks WHERE id = ?")
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_chunk).transpose()
    }

    /// Chunk ids belonging to versions of a document older than `version`.
    /// Used to retire a prior generation when a new version is indexed.
    pub async fn chunk_ids_before_version(
        &self,
        document_id: &str,
        version: u64,
    ) -> Result<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM chunks WHERE document_id = ? AND version < ?")
                .bind(document_id)
                .bind(version as i64)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    pub async fn put_embedding(
        &self,
        chunk_id: &str,
        text_hash: &str,
        vector: &[f32],
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO embeddings (chunk_id, text_hash, dims, vector) VALUES (?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                text_hash = excluded.text_hash,
                dims = excluded.dims,
                vector = excluded.vector
            "#,
        )
        .bind(chunk_id)
        .bind(text_hash)
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stored embedding and the text hash it was computed from.
    pub async fn embedding_for(&self, chunk_id: &str) -> Result<Option<(String, Vec<f32>)>> {
        let row = sqlx::query("SELECT text_hash, vector FROM embeddings WHERE chunk_id = ?")
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| {
            let hash: String = row.get("text_hash");
            let blob: Vec<u8> = row.get("vector");
            (hash, blob_to_vec(&blob))
        }))
    }

    pub async fn set_pipeline_state(&self, document_id: &str, version: u64, state: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_state (document_id, version, state, attempts, last_error, updated_at)
            VALUES (?, ?, ?, 0, NULL, ?)
            ON CONFLICT(document_id, version) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(document_id)
        .bind(version as i64)
        .bind(state)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a terminal failure with its error, bumping the attempt count.
    pub async fn mark_pipeline_failed(
        &self,
        document_id: &str,
        version: u64,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_state (document_id, version, state, attempts, last_error, updated_at)
            VALUES (?, ?, 'failed', 1, ?, ?)
            ON CONFLICT(document_id, version) DO UPDATE SET
                state = 'failed',
                attempts = pipeline_state.attempts + 1,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(document_id)
        .bind(version as i64)
        .bind(error)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn pipeline_state(
        &self,
        document_id: &str,
        version: u64,
    ) -> Result<Option<String>> {
        let state: Option<String> = sqlx::query_scalar(
            "SELECT state FROM pipeline_state WHERE document_id = ? AND version = ?",
        )
        .bind(document_id)
        .bind(version as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(state)
    }

    pub async fn checkpoint(&self, name: &str) -> Result<Option<String>> {
        let cursor: Option<String> =
            sqlx::query_scalar("SELECT cursor FROM checkpoints WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(cursor)
    }

    pub async fn set_checkpoint(&self, name: &str, cursor: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO checkpoints (name, cursor, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET cursor = excluded.cursor, updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(cursor)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn put_enrichment(&self, row: &EnrichmentRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO enrichment
                (chunk_id, facet, value, confidence, authoritative, enricher, enricher_version, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id, facet, value) DO UPDATE SET
                confidence = excluded.confidence,
                authoritative = excluded.authoritative,
                enricher = excluded.enricher,
                enricher_version = excluded.enricher_version,
                created_at = excluded.created_at
            "#,
        )
        .bind(&row.chunk_id)
        .bind(&row.facet)
        .bind(&row.value)
        .bind(row.confidence as f64)
        .bind(row.authoritative as i64)
        .bind(&row.enricher)
        .bind(row.enricher_version as i64)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn enrichment_for(&self, chunk_id: &str) -> Result<Vec<EnrichmentRow>> {
        let rows = sqlx::query("SELECT * FROM enrichment WHERE chunk_id = ?")
            .bind(chunk_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| EnrichmentRow {
                chunk_id: row.get("chunk_id"),
                facet: row.get("facet"),
                value: row.get("value"),
                confidence: row.get::<f64, _>("confidence") as f32,
                authoritative: row.get::<i64, _>("authoritative") != 0,
                enricher: row.get("enricher"),
                enricher_version: row.get::<i64, _>("enricher_version") as u32,
            })
            .collect())
    }

    /// All authoritative enrichment facets, keyed by chunk id. Used by the
    /// index rebuild to restore filterable tags.
    pub async fn authoritative_tags(&self) -> Result<HashMap<String, Vec<(String, String)>>> {
        let rows = sqlx::query("SELECT chunk_id, facet, value FROM enrichment WHERE authoritative = 1")
            .fetch_all(&self.pool)
            .await?;

        let mut map: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for row in &rows {
            map.entry(row.get("chunk_id"))
                .or_default()
                .push((row.get("facet"), row.get("value")));
        }
        Ok(map)
    }

    pub async fn facet_values(&self, facet: &str) -> Result<Vec<String>> {
        let values: Vec<String> =
            sqlx::query_scalar("SELECT value FROM facet_vocab WHERE facet = ? ORDER BY value")
                .bind(facet)
                .fetch_all(&self.pool)
                .await?;
        Ok(values)
    }

    /// Chunks whose embedding is missing or was computed from different
    /// text. The embedding backfill works through this set.
    pub async fn chunks_missing_embeddings(&self, limit: usize) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.* FROM chunks c
            LEFT JOIN embeddings e ON e.chunk_id = c.id
            WHERE e.chunk_id IS NULL OR e.text_hash != c.hash
            ORDER BY c.document_id, c.version, c.chunk_index
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_chunk).collect()
    }

    /// Total stored chunks; the lexical index must agree.
    pub async fn count_chunks(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Chunks with a current embedding; the vector index must agree.
    pub async fn count_embedded_chunks(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chunks c JOIN embeddings e ON e.chunk_id = c.id AND e.text_hash = c.hash",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Physically remove a document id with all versions, chunks,
    /// embeddings and enrichment. The only physical delete; reserved for
    /// retention/compliance purges.
    pub async fn purge_document(&self, id: &str) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let chunk_ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM chunks WHERE document_id = ?")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?)")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM enrichment WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?)")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM pipeline_state WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(chunk_ids)
    }
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let source_type: String = row.get("source_type");
    let status: String = row.get("status");
    Ok(Document {
        id: row.get("id"),
        version: row.get::<i64, _>("version") as u64,
        seq: row.get("seq"),
        source_type: SourceType::parse(&source_type)?,
        committee: row.get("committee"),
        case_number: row.get("case_number"),
        published_at: row.get("published_at"),
        status: DocStatus::parse(&status)?,
        body: row.get("body"),
        body_hash: row.get("body_hash"),
    })
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk> {
    Ok(Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        version: row.get::<i64, _>("version") as u64,
        chunk_index: row.get("chunk_index"),
        start_offset: row.get("start_offset"),
        end_offset: row.get("end_offset"),
        text: row.get("text"),
        hash: row.get("hash"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use chrono::TimeZone;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, DocumentStore) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.sqlite");
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .unwrap()
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        (tmp, DocumentStore::new(pool))
    }

    fn doc(id: &str, version: u64, body: &str) -> SourceDocument {
        SourceDocument {
            id: id.to_string(),
            source_type: SourceType::Minutes,
            committee: "Byrådet".to_string(),
            case_number: format!("SAG-2024-{id}"),
            published_at: Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap(),
            version,
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get_current() {
        let (_tmp, store) = test_store().await;

        let outcome = store.put_document(&doc("d1", 1, "budget notes")).await.unwrap();
        assert!(matches!(outcome, PutOutcome::Inserted { seq: 1 }));

        let current = store.get_current("d1").await.unwrap();
        assert_eq!(current.version, 1);
        assert_eq!(current.status, DocStatus::Open);
        assert_eq!(current.body, "budget notes");
    }

    #[tokio::test]
    async fn test_put_is_idempotent_per_version() {
        let (_tmp, store) = test_store().await;

        store.put_document(&doc("d1", 1, "text")).await.unwrap();
        let outcome = store.put_document(&doc("d1", 1, "text")).await.unwrap();
        assert_eq!(outcome, PutOutcome::Unchanged);

        // Sequence unchanged: the replay assigned no new cursor position.
        assert_eq!(store.max_seq().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_new_version_supersedes_old() {
        let (_tmp, store) = test_store().await;

        store.put_document(&doc("d1", 1, "v1 text")).await.unwrap();
        store.put_document(&doc("d1", 2, "v2 text")).await.unwrap();

        let current = store.get_current("d1").await.unwrap();
        assert_eq!(current.version, 2);

        let old = store.get_version("d1", 1).await.unwrap();
        assert_eq!(old.status, DocStatus::Superseded);
    }

    #[tokio::test]
    async fn test_out_of_order_version_conflicts() {
        let (_tmp, store) = test_store().await;

        store.put_document(&doc("d1", 2, "v2 text")).await.unwrap();
        let err = store.put_document(&doc("d1", 1, "v1 text")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict {
                submitted: 1,
                current: 2,
                ..
            }
        ));

        // v2 stays current.
        assert_eq!(store.get_current("d1").await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_get_current_not_found() {
        let (_tmp, store) = test_store().await;
        assert!(matches!(
            store.get_current("missing").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_documents_after_pages_in_order() {
        let (_tmp, store) = test_store().await;

        store.put_document(&doc("d1", 1, "a")).await.unwrap();
        store.put_document(&doc("d2", 1, "b")).await.unwrap();
        store.put_document(&doc("d3", 1, "c")).await.unwrap();

        let page = store.documents_after(0, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "d1");
        assert_eq!(page[1].id, "d2");

        // Restartable from the last seq seen.
        let rest = store.documents_after(page[1].seq, 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "d3");
    }

    #[tokio::test]
    async fn test_chunk_roundtrip_and_retire_lookup() {
        let (_tmp, store) = test_store().await;
        store.put_document(&doc("d1", 1, "one two")).await.unwrap();

        let chunk = Chunk {
            id: "c1".to_string(),
            document_id: "d1".to_string(),
            version: 1,
            chunk_index: 0,
            start_offset: 0,
            end_offset: 7,
            text: "one two".to_string(),
            hash: hash_text("one two"),
        };
        store.replace_chunks("d1", 1, &[chunk.clone()]).await.unwrap();

        let loaded = store.chunks_for("d1", 1).await.unwrap();
        assert_eq!(loaded, vec![chunk]);

        let old_ids = store.chunk_ids_before_version("d1", 2).await.unwrap();
        assert_eq!(old_ids, vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn test_embedding_reuse_by_hash() {
        let (_tmp, store) = test_store().await;

        store
            .put_embedding("c1", "hash-a", &[0.1, 0.2, 0.3])
            .await
            .unwrap();
        let (hash, vector) = store.embedding_for("c1").await.unwrap().unwrap();
        assert_eq!(hash, "hash-a");
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);

        // Upsert replaces in place.
        store.put_embedding("c1", "hash-b", &[0.4]).await.unwrap();
        let (hash, vector) = store.embedding_for("c1").await.unwrap().unwrap();
        assert_eq!(hash, "hash-b");
        assert_eq!(vector, vec![0.4]);
    }

    #[tokio::test]
    async fn test_purge_document_removes_everything() {
        let (_tmp, store) = test_store().await;
        store.put_document(&doc("d1", 1, "text")).await.unwrap();
        let chunk = Chunk {
            id: "c1".to_string(),
            document_id: "d1".to_string(),
            version: 1,
            chunk_index: 0,
            start_offset: 0,
            end_offset: 4,
            text: "text".to_string(),
            hash: hash_text("text"),
        };
        store.replace_chunks("d1", 1, &[chunk]).await.unwrap();
        store.put_embedding("c1", "h", &[1.0]).await.unwrap();

        let purged = store.purge_document("d1").await.unwrap();
        assert_eq!(purged, vec!["c1".to_string()]);
        assert!(store.get_current("d1").await.is_err());
        assert!(store.chunk("c1").await.unwrap().is_none());
        assert!(store.embedding_for("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_facet_vocab_grows_on_ingest() {
        let (_tmp, store) = test_store().await;
        store.put_document(&doc("d1", 1, "x")).await.unwrap();

        let committees = store.facet_values("committee").await.unwrap();
        assert_eq!(committees, vec!["Byrådet".to_string()]);
        let types = store.facet_values("source_type").await.unwrap();
        assert_eq!(types, vec!["minutes".to_string()]);
    }

    #[tokio::test]
    async fn test_case_history_newest_first() {
        let (_tmp, store) = test_store().await;
        let mut early = doc("d1", 1, "a");
        early.case_number = "SAG-2024-7".to_string();
        early.published_at = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
        let mut late = doc("d2", 1, "b");
        late.case_number = "SAG-2024-7".to_string();
        late.published_at = Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();

        store.put_document(&early).await.unwrap();
        store.put_document(&late).await.unwrap();

        let history = store.case_history("SAG-2024-7").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, "d2");
        assert_eq!(history[1].id, "d1");
    }
}
