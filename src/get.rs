//! Document retrieval by id and case history.
//!
//! Fetches a full document version with its chunks and enrichment facets.
//! Used by the `dgs get` and `dgs case` commands.

use serde::Serialize;

use crate::error::Result;
use crate::store::DocumentStore;

/// Full document response: metadata, body, chunks, enrichment.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub version: u64,
    pub status: String,
    pub source_type: String,
    pub committee: String,
    pub case_number: String,
    pub published_at: String,
    pub body: String,
    pub chunks: Vec<ChunkResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkResponse {
    pub index: i64,
    pub text: String,
    pub facets: Vec<FacetResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacetResponse {
    pub facet: String,
    pub value: String,
    pub confidence: f32,
    pub authoritative: bool,
}

/// One row of a case's history.
#[derive(Debug, Clone, Serialize)]
pub struct CaseEntry {
    pub document_id: String,
    pub version: u64,
    pub source_type: String,
    pub committee: String,
    pub published_at: String,
}

/// Fetch a document: the open version by default, or a specific version
/// (superseded versions stay retrievable for audit).
pub async fn get_document(
    store: &DocumentStore,
    id: &str,
    version: Option<u64>,
) -> Result<DocumentResponse> {
    let doc = match version {
        Some(version) => store.get_version(id, version).await?,
        None => store.get_current(id).await?,
    };

    let mut chunks = Vec::new();
    for chunk in store.chunks_for(&doc.id, doc.version).await? {
        let facets = store
            .enrichment_for(&chunk.id)
            .await?
            .into_iter()
            .map(|row| FacetResponse {
                facet: row.facet,
                value: row.value,
                confidence: row.confidence,
                authoritative: row.authoritative,
            })
            .collect();

        chunks.push(ChunkResponse {
            index: chunk.chunk_index,
            text: chunk.text,
            facets,
        });
    }

    Ok(DocumentResponse {
        id: doc.id,
        version: doc.version,
        status: doc.status.as_str().to_string(),
        source_type: doc.source_type.as_str().to_string(),
        committee: doc.committee,
        case_number: doc.case_number,
        published_at: format_date(doc.published_at),
        body: doc.body,
        chunks,
    })
}

/// All open documents for a case, newest first — an overview of how the
/// case moved across meetings.
pub async fn case_history(store: &DocumentStore, case_number: &str) -> Result<Vec<CaseEntry>> {
    let docs = store.case_history(case_number).await?;
    Ok(docs
        .into_iter()
        .map(|doc| CaseEntry {
            document_id: doc.id,
            version: doc.version,
            source_type: doc.source_type.as_str().to_string(),
            committee: doc.committee,
            published_at: format_date(doc.published_at),
        })
        .collect())
}

fn format_date(epoch_seconds: i64) -> String {
    chrono::DateTime::from_timestamp(epoch_seconds, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| epoch_seconds.to_string())
}
