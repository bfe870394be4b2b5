//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow: change feed → normalization → document store
//! → chunking → embedding → indexing → enrichment, idempotently and
//! incrementally.
//!
//! Two cursors drive the pipeline. The opaque feed cursor (checkpoints
//! table) marks how far the external publication feed has been drained; it
//! commits after each page's items are durably stored, so a crash replays
//! at most one page into idempotent writes. The index cursor is the store
//! sequence baked into the index snapshots; it advances only after every
//! document in a batch reaches a terminal state, so a partially indexed
//! batch is re-processed after a crash rather than silently lost.
//!
//! Per-document states (`fetched → normalized → chunked → embedded →
//! indexed → enriched`, or `failed`) are persisted for crash forensics and
//! resume. Documents in a batch are deduplicated by id, which serializes
//! writes to any single document; distinct documents proceed in parallel
//! under a bounded number of workers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::chunk::chunk_document;
use crate::config::{ChunkingConfig, EnrichmentConfig, IngestConfig};
use crate::embedding::EmbeddingProvider;
use crate::enrich::EnrichmentEngine;
use crate::error::{Error, Result};
use crate::lexical::LexicalIndex;
use crate::models::{Chunk, ChunkMeta, DocStatus, Document};
use crate::source::{normalize_item, ChangeFeed, FeedItem, TextExtractor};
use crate::store::{DocumentStore, PutOutcome};
use crate::vector::VectorIndex;

const FEED_CURSOR: &str = "feed";

/// Counters reported by one sync run.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub fetched: u64,
    pub stored: u64,
    pub unchanged: u64,
    pub conflicts: u64,
    pub fetch_failures: u64,
    pub indexed: u64,
    pub embed_failures: u64,
    pub index_seq: i64,
}

enum DocOutcome {
    Indexed,
    Failed,
}

#[derive(Clone)]
pub struct IngestionPipeline {
    store: DocumentStore,
    lexical: Arc<LexicalIndex>,
    vector: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    feed: Arc<dyn ChangeFeed>,
    extractor: Arc<dyn TextExtractor>,
    enrichment: Arc<EnrichmentEngine>,
    ingest: IngestConfig,
    chunking: ChunkingConfig,
    enrichment_cfg: EnrichmentConfig,
    feed_page_size: usize,
    index_dir: PathBuf,
    /// Store sequence both indexes reflect; advanced per committed batch.
    index_seq: Arc<AtomicI64>,
}

impl IngestionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: DocumentStore,
        lexical: Arc<LexicalIndex>,
        vector: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        feed: Arc<dyn ChangeFeed>,
        extractor: Arc<dyn TextExtractor>,
        enrichment: Arc<EnrichmentEngine>,
        ingest: IngestConfig,
        chunking: ChunkingConfig,
        enrichment_cfg: EnrichmentConfig,
        feed_page_size: usize,
        index_dir: PathBuf,
        index_seq: i64,
    ) -> Self {
        Self {
            store,
            lexical,
            vector,
            embedder,
            feed,
            extractor,
            enrichment,
            ingest,
            chunking,
            enrichment_cfg,
            feed_page_size,
            index_dir,
            index_seq: Arc::new(AtomicI64::new(index_seq)),
        }
    }

    pub fn index_seq(&self) -> i64 {
        self.index_seq.load(Ordering::SeqCst)
    }

    /// Run one full sync: drain the change feed into the store, then bring
    /// both indexes up to the store head, batch by batch.
    pub async fn run_sync(&self, limit: Option<usize>, full: bool) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        self.fetch_changes(&mut report, limit, full).await?;
        self.index_changes(&mut report).await?;
        report.index_seq = self.index_seq();
        Ok(report)
    }

    // ---- fetch stage ----

    async fn fetch_changes(
        &self,
        report: &mut SyncReport,
        limit: Option<usize>,
        full: bool,
    ) -> Result<()> {
        let mut cursor = if full {
            None
        } else {
            self.store.checkpoint(FEED_CURSOR).await?
        };

        'pages: loop {
            let page = self
                .feed
                .fetch_page(cursor.as_deref(), self.feed_page_size)
                .await?;

            if page.items.is_empty() {
                break;
            }

            for item in &page.items {
                if let Some(lim) = limit {
                    if report.fetched >= lim as u64 {
                        break 'pages;
                    }
                }
                report.fetched += 1;
                self.ingest_item(report, item).await?;
            }

            // The page's items are durable; a crash from here re-reads at
            // most the next page.
            match page.next_cursor {
                Some(next) => {
                    self.store.set_checkpoint(FEED_CURSOR, &next).await?;
                    cursor = Some(next);
                }
                None => break,
            }
        }

        Ok(())
    }

    async fn ingest_item(&self, report: &mut SyncReport, item: &FeedItem) -> Result<()> {
        // First sighting of this (id, version) gets a progress row;
        // replays of already-processed versions leave their state alone.
        if self
            .store
            .pipeline_state(item.id.trim(), item.version)
            .await?
            .is_none()
        {
            self.store
                .set_pipeline_state(item.id.trim(), item.version, "fetched")
                .await?;
        }

        // Normalization may fetch and extract an attachment; transient
        // failures are retried with backoff before the document is given
        // up as failed.
        let mut normalized = None;
        let mut last_err = None;
        for attempt in 0..=self.ingest.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }
            match normalize_item(item, self.extractor.as_ref()).await {
                Ok(doc) => {
                    normalized = Some(doc);
                    break;
                }
                Err(e) if e.is_transient() => {
                    debug!(id = %item.id, attempt, error = %e, "normalize retry");
                    last_err = Some(e);
                }
                Err(e) => {
                    last_err = Some(e);
                    break;
                }
            }
        }

        let Some(doc) = normalized else {
            let err = last_err.map(|e| e.to_string()).unwrap_or_default();
            warn!(id = %item.id, version = item.version, error = %err, "document failed to normalize");
            self.store
                .mark_pipeline_failed(item.id.trim(), item.version, &err)
                .await?;
            report.fetch_failures += 1;
            return Ok(());
        };

        match self.store.put_document(&doc).await {
            Ok(PutOutcome::Inserted { seq }) => {
                debug!(id = %doc.id, version = doc.version, seq, "stored document version");
                self.store
                    .set_pipeline_state(&doc.id, doc.version, "normalized")
                    .await?;
                report.stored += 1;
            }
            Ok(PutOutcome::Unchanged) => {
                report.unchanged += 1;
            }
            Err(Error::Conflict { id, submitted, current }) => {
                warn!(%id, submitted, current, "out-of-order version from feed, keeping current");
                report.conflicts += 1;
            }
            Err(e) => return Err(e),
        }

        Ok(())
    }

    // ---- index stage ----

    async fn index_changes(&self, report: &mut SyncReport) -> Result<()> {
        loop {
            let cursor = self.index_seq();
            let docs = self
                .store
                .documents_after(cursor, self.ingest.batch_size)
                .await?;
            if docs.is_empty() {
                break;
            }
            let batch_seq = docs.last().map(|d| d.seq).unwrap_or(cursor);

            // Group by document id: one worker owns all versions of a
            // document and processes them in sequence order, so writes to
            // a single document are serialized while distinct documents
            // proceed in parallel.
            let mut by_id: HashMap<String, Vec<Document>> = HashMap::new();
            for doc in docs {
                by_id.entry(doc.id.clone()).or_default().push(doc);
            }

            let semaphore = Arc::new(Semaphore::new(self.ingest.concurrency));
            let mut handles = Vec::with_capacity(by_id.len());

            for versions in by_id.into_values() {
                let pipeline = self.clone();
                let semaphore = Arc::clone(&semaphore);
                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                    let mut outcomes = Vec::with_capacity(versions.len());
                    for doc in versions {
                        outcomes.push(pipeline.process_document(doc).await?);
                    }
                    Ok::<_, Error>(outcomes)
                }));
            }

            for handle in handles {
                match handle.await {
                    Ok(Ok(outcomes)) => {
                        for outcome in outcomes {
                            match outcome {
                                DocOutcome::Indexed => report.indexed += 1,
                                DocOutcome::Failed => report.embed_failures += 1,
                            }
                        }
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(e) => {
                        return Err(Error::IndexInconsistency {
                            index: "pipeline",
                            detail: format!("worker panicked: {e}"),
                        })
                    }
                }
            }

            // Every document in the batch is terminal: commit the cursor
            // by persisting both index snapshots at the new watermark.
            self.save_snapshots(batch_seq)?;
            self.index_seq.store(batch_seq, Ordering::SeqCst);
            info!(cursor = batch_seq, "index batch committed");
        }

        Ok(())
    }

    /// Drive one document version through chunk → embed → index → enrich.
    /// Embedding failures degrade rather than block: the chunks are still
    /// lexically indexed, and the document is recorded as failed for the
    /// embedding backfill to pick up.
    async fn process_document(&self, doc: Document) -> Result<DocOutcome> {
        let chunks = chunk_document(&doc.id, doc.version, &doc.body, self.chunking.max_tokens);

        let stored = self.store.chunks_for(&doc.id, doc.version).await?;
        if stored != chunks {
            self.store
                .replace_chunks(&doc.id, doc.version, &chunks)
                .await?;
        }
        self.store
            .set_pipeline_state(&doc.id, doc.version, "chunked")
            .await?;

        // Embeddings are recomputed only when the chunk text hash changed.
        let mut vectors: HashMap<String, Vec<f32>> = HashMap::new();
        let mut pending: Vec<&Chunk> = Vec::new();
        for chunk in &chunks {
            match self.store.embedding_for(&chunk.id).await? {
                Some((hash, vector)) if hash == chunk.hash => {
                    vectors.insert(chunk.id.clone(), vector);
                }
                _ => pending.push(chunk),
            }
        }

        let mut embed_error = None;
        if self.embedder.dims() > 0 && !pending.is_empty() {
            for batch in pending.chunks(self.ingest.batch_size.max(1)) {
                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                match self.embedder.embed(&texts).await {
                    Ok(embeddings) => {
                        for (chunk, vector) in batch.iter().zip(embeddings) {
                            self.store
                                .put_embedding(&chunk.id, &chunk.hash, &vector)
                                .await?;
                            vectors.insert(chunk.id.clone(), vector);
                        }
                    }
                    Err(e) => {
                        warn!(id = %doc.id, version = doc.version, error = %e, "embedding failed, chunks stay lexical-only");
                        embed_error = Some(e.to_string());
                        break;
                    }
                }
            }
        }
        if embed_error.is_none() {
            self.store
                .set_pipeline_state(&doc.id, doc.version, "embedded")
                .await?;
        }

        // Index: lexical always, vector for the chunks that have vectors.
        let superseded = doc.status == DocStatus::Superseded;
        let items: Vec<(ChunkMeta, String)> = chunks
            .iter()
            .map(|chunk| (chunk_meta(&doc, chunk, superseded), chunk.text.clone()))
            .collect();
        self.lexical.index_chunks(&items);

        for chunk in &chunks {
            if let Some(vector) = vectors.get(&chunk.id) {
                self.vector
                    .insert(chunk_meta(&doc, chunk, superseded), vector.clone())?;
            }
        }

        // Retire the previous generation of this document.
        let old_ids = self
            .store
            .chunk_ids_before_version(&doc.id, doc.version)
            .await?;
        if !old_ids.is_empty() {
            self.lexical.retire_chunks(&old_ids);
            self.vector.retire_chunks(&old_ids);
        }
        self.store
            .set_pipeline_state(&doc.id, doc.version, "indexed")
            .await?;

        // Enrichment is best-effort and never blocks searchability.
        if self.enrichment_cfg.enabled && !self.enrichment.is_empty() {
            for chunk in &chunks {
                match self.enrichment.enrich_chunk(&self.store, chunk).await {
                    Ok(tags) if !tags.is_empty() => {
                        self.lexical.set_tags(&chunk.id, tags.clone());
                        self.vector.set_tags(&chunk.id, tags);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(chunk_id = %chunk.id, error = %e, "enrichment failed, skipping chunk");
                    }
                }
            }
        }

        match embed_error {
            Some(err) => {
                self.store
                    .mark_pipeline_failed(&doc.id, doc.version, &err)
                    .await?;
                Ok(DocOutcome::Failed)
            }
            None => {
                self.store
                    .set_pipeline_state(&doc.id, doc.version, "enriched")
                    .await?;
                Ok(DocOutcome::Indexed)
            }
        }
    }

    // ---- embedding backfill ----

    /// Embed chunks whose embedding is missing or stale (for example after
    /// a sync ran with the provider down) and feed them into the vector
    /// index.
    pub async fn embed_pending(&self) -> Result<(u64, u64)> {
        if self.embedder.dims() == 0 {
            return Err(Error::Config(
                "embedding provider is disabled; nothing to backfill".into(),
            ));
        }

        let mut embedded = 0u64;
        let mut failed = 0u64;

        loop {
            let pending = self
                .store
                .chunks_missing_embeddings(self.ingest.batch_size)
                .await?;
            if pending.is_empty() {
                break;
            }

            let texts: Vec<String> = pending.iter().map(|c| c.text.clone()).collect();
            let embeddings = match self.embedder.embed(&texts).await {
                Ok(embeddings) => embeddings,
                Err(e) => {
                    warn!(error = %e, "embedding backfill batch failed");
                    failed += pending.len() as u64;
                    break;
                }
            };

            for (chunk, vector) in pending.iter().zip(embeddings) {
                self.store
                    .put_embedding(&chunk.id, &chunk.hash, &vector)
                    .await?;

                let doc = self.store.get_version(&chunk.document_id, chunk.version).await?;
                let superseded = doc.status == DocStatus::Superseded;
                self.vector
                    .insert(chunk_meta(&doc, chunk, superseded), vector)?;
                embedded += 1;
            }
        }

        self.save_snapshots(self.index_seq())?;
        Ok((embedded, failed))
    }

    /// Re-run enrichment over every stored chunk of live documents.
    pub async fn enrich_all(&self) -> Result<u64> {
        let mut enriched = 0u64;
        let mut cursor = 0i64;

        loop {
            let docs = self
                .store
                .documents_after(cursor, self.ingest.batch_size)
                .await?;
            if docs.is_empty() {
                break;
            }
            cursor = docs.last().map(|d| d.seq).unwrap_or(cursor);

            for doc in docs {
                for chunk in self.store.chunks_for(&doc.id, doc.version).await? {
                    match self.enrichment.enrich_chunk(&self.store, &chunk).await {
                        Ok(tags) => {
                            if !tags.is_empty() {
                                self.lexical.set_tags(&chunk.id, tags.clone());
                                self.vector.set_tags(&chunk.id, tags);
                            }
                            enriched += 1;
                        }
                        Err(e) => {
                            warn!(chunk_id = %chunk.id, error = %e, "enrichment failed, skipping chunk");
                        }
                    }
                }
            }
        }

        self.save_snapshots(self.index_seq())?;
        Ok(enriched)
    }

    fn save_snapshots(&self, seq: i64) -> Result<()> {
        std::fs::create_dir_all(&self.index_dir)?;
        self.lexical
            .save(&self.index_dir.join("lexical.idx"), seq)?;
        self.vector.save(&self.index_dir.join("vector.idx"), seq)?;
        Ok(())
    }
}

fn chunk_meta(doc: &Document, chunk: &Chunk, superseded: bool) -> ChunkMeta {
    ChunkMeta {
        chunk_id: chunk.id.clone(),
        document_id: doc.id.clone(),
        version: doc.version,
        source_type: doc.source_type,
        committee: doc.committee.clone(),
        case_number: doc.case_number.clone(),
        published_at: doc.published_at,
        superseded,
        tags: Vec::new(),
    }
}
