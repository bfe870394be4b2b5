//! Index lifecycle: startup loading, incremental catch-up, full rebuild,
//! and consistency verification.
//!
//! Both indexes are derived caches over the document store. At startup
//! they are restored from their snapshots and caught up from the store
//! sequence they reflect; with no usable snapshot, they are rebuilt from
//! scratch. A rebuild constructs the new generation offline while queries
//! keep hitting the previous one, then swaps atomically.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lexical::LexicalIndex;
use crate::models::{ChunkMeta, DocStatus, Document};
use crate::store::DocumentStore;
use crate::vector::{Similarity, VectorIndex};

const PAGE: usize = 256;

/// Build empty indexes from configuration.
pub fn build_indexes(config: &Config) -> Result<(Arc<LexicalIndex>, Arc<VectorIndex>)> {
    let lexical = Arc::new(LexicalIndex::new(config.lexical.k1, config.lexical.b));
    let vector = Arc::new(VectorIndex::new(
        config.embedding.dims.unwrap_or(0),
        Similarity::parse(&config.vector.metric)?,
        config.vector.ef_construction,
    ));
    Ok((lexical, vector))
}

/// Restore both indexes for this process: load snapshots when present and
/// catch up from their watermark, rebuild from the store otherwise.
/// Returns the indexes and the store sequence they now reflect.
pub async fn load_or_rebuild(
    config: &Config,
    store: &DocumentStore,
) -> Result<(Arc<LexicalIndex>, Arc<VectorIndex>, i64)> {
    let (lexical, vector) = build_indexes(config)?;

    let lexical_path = config.store.index_dir.join("lexical.idx");
    let vector_path = config.store.index_dir.join("vector.idx");

    let lexical_seq = match lexical.load(&lexical_path) {
        Ok(seq) => seq,
        Err(e) => {
            warn!(error = %e, "lexical snapshot unreadable, falling back to rebuild");
            None
        }
    };
    let vector_seq = match vector.load(&vector_path) {
        Ok(seq) => seq,
        Err(e) => {
            warn!(error = %e, "vector snapshot unreadable, falling back to rebuild");
            None
        }
    };

    let seq = match (lexical_seq, vector_seq) {
        (Some(a), Some(b)) => {
            let watermark = a.min(b);
            let head = catch_up(store, &lexical, &vector, watermark).await?;
            info!(watermark, head, "indexes restored from snapshots");
            head
        }
        _ => {
            let head = rebuild(store, &lexical, &vector).await?;
            info!(head, "indexes rebuilt from document store");
            head
        }
    };

    Ok((lexical, vector, seq))
}

/// Apply document-store changes after `watermark` to already-loaded
/// indexes. Embeddings come from the store; no provider calls happen here.
pub async fn catch_up(
    store: &DocumentStore,
    lexical: &LexicalIndex,
    vector: &VectorIndex,
    watermark: i64,
) -> Result<i64> {
    let tags = store.authoritative_tags().await?;
    let mut cursor = watermark;
    loop {
        let docs = store.documents_after(cursor, PAGE).await?;
        if docs.is_empty() {
            break;
        }
        cursor = docs.last().map(|d| d.seq).unwrap_or(cursor);

        for doc in docs {
            index_document(store, lexical, vector, &doc, &tags).await?;
            let old_ids = store.chunk_ids_before_version(&doc.id, doc.version).await?;
            if !old_ids.is_empty() {
                lexical.retire_chunks(&old_ids);
                vector.retire_chunks(&old_ids);
            }
        }
    }
    Ok(cursor)
}

/// Rebuild both indexes entirely from the document store, then swap the
/// fresh generations in atomically. Live queries keep hitting the old
/// generations until the swap. Returns the store sequence reflected.
pub async fn rebuild(
    store: &DocumentStore,
    lexical: &LexicalIndex,
    vector: &VectorIndex,
) -> Result<i64> {
    let tags = store.authoritative_tags().await?;

    let mut lexical_items: Vec<(ChunkMeta, String)> = Vec::new();
    let mut vector_items: Vec<(ChunkMeta, Vec<f32>)> = Vec::new();

    let mut cursor = 0i64;
    loop {
        let docs = store.documents_after(cursor, PAGE).await?;
        if docs.is_empty() {
            break;
        }
        cursor = docs.last().map(|d| d.seq).unwrap_or(cursor);

        for doc in docs {
            if doc.status == DocStatus::Deleted {
                continue;
            }
            let superseded = doc.status == DocStatus::Superseded;
            for chunk in store.chunks_for(&doc.id, doc.version).await? {
                let mut meta = meta_for(&doc, &chunk.id, superseded);
                if let Some(chunk_tags) = tags.get(&chunk.id) {
                    meta.tags = chunk_tags.clone();
                }

                if let Some((hash, embedding)) = store.embedding_for(&chunk.id).await? {
                    if hash == chunk.hash {
                        vector_items.push((meta.clone(), embedding));
                    }
                }
                lexical_items.push((meta, chunk.text));
            }
        }
    }

    lexical.rebuild(lexical_items);
    vector.rebuild(vector_items)?;
    Ok(cursor)
}

/// Check that the derived indexes agree with the document store. A
/// mismatch is fatal to the affected index generation only — the remedy
/// is [`rebuild`], not a process crash.
pub async fn verify(
    store: &DocumentStore,
    lexical: &LexicalIndex,
    vector: &VectorIndex,
) -> Result<()> {
    let stored_chunks = store.count_chunks().await?;
    let indexed_chunks = lexical.len() as i64;
    if stored_chunks != indexed_chunks {
        return Err(Error::IndexInconsistency {
            index: "lexical",
            detail: format!("store has {stored_chunks} chunks, index has {indexed_chunks}"),
        });
    }

    let stored_embedded = store.count_embedded_chunks().await?;
    let indexed_embedded = vector.len() as i64;
    if stored_embedded != indexed_embedded {
        return Err(Error::IndexInconsistency {
            index: "vector",
            detail: format!(
                "store has {stored_embedded} embedded chunks, index has {indexed_embedded}"
            ),
        });
    }

    Ok(())
}

async fn index_document(
    store: &DocumentStore,
    lexical: &LexicalIndex,
    vector: &VectorIndex,
    doc: &Document,
    tags: &std::collections::HashMap<String, Vec<(String, String)>>,
) -> Result<()> {
    let superseded = doc.status == DocStatus::Superseded;
    let chunks = store.chunks_for(&doc.id, doc.version).await?;

    let tagged_meta = |chunk_id: &str| {
        let mut meta = meta_for(doc, chunk_id, superseded);
        if let Some(chunk_tags) = tags.get(chunk_id) {
            meta.tags = chunk_tags.clone();
        }
        meta
    };

    let items: Vec<(ChunkMeta, String)> = chunks
        .iter()
        .map(|chunk| (tagged_meta(&chunk.id), chunk.text.clone()))
        .collect();
    lexical.index_chunks(&items);

    for chunk in &chunks {
        if let Some((hash, embedding)) = store.embedding_for(&chunk.id).await? {
            if hash == chunk.hash {
                vector.insert(tagged_meta(&chunk.id), embedding)?;
            }
        }
    }
    Ok(())
}

fn meta_for(doc: &Document, chunk_id: &str, superseded: bool) -> ChunkMeta {
    ChunkMeta {
        chunk_id: chunk_id.to_string(),
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
