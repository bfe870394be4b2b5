//! Core data models used throughout dagsorden.
//!
//! These types represent the documents, chunks, and filters that flow
//! through the ingestion and retrieval pipeline. Timestamps are stored as
//! Unix epoch seconds (UTC) and rendered as ISO-8601 at the edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of council record, a closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Agenda,
    Minutes,
    Attachment,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Agenda => "agenda",
            SourceType::Minutes => "minutes",
            SourceType::Attachment => "attachment",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "agenda" => Ok(SourceType::Agenda),
            "minutes" => Ok(SourceType::Minutes),
            "attachment" => Ok(SourceType::Attachment),
            other => Err(Error::Config(format!("unknown source type: {other}"))),
        }
    }
}

/// Lifecycle state of a stored document version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    Open,
    Superseded,
    Deleted,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocStatus::Open => "open",
            DocStatus::Superseded => "superseded",
            DocStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(DocStatus::Open),
            "superseded" => Ok(DocStatus::Superseded),
            "deleted" => Ok(DocStatus::Deleted),
            other => Err(Error::Config(format!("unknown document status: {other}"))),
        }
    }
}

/// Normalized item handed to the document store by the pipeline: one
/// version of one council record, with its text already extracted.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Stable external case/item identifier.
    pub id: String,
    pub source_type: SourceType,
    pub committee: String,
    pub case_number: String,
    pub published_at: DateTime<Utc>,
    /// Monotonically increasing per external update.
    pub version: u64,
    /// Raw or extractor-derived text.
    pub body: String,
}

/// A stored document version.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub version: u64,
    /// Store change sequence, assigned on write; the change cursor orders
    /// by this.
    pub seq: i64,
    pub source_type: SourceType,
    pub committee: String,
    pub case_number: String,
    pub published_at: i64,
    pub status: DocStatus,
    pub body: String,
    pub body_hash: String,
}

/// A contiguous text span of one document version.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic id derived from (document id, version, index), so
    /// re-chunking an unchanged version produces identical chunks.
    pub id: String,
    pub document_id: String,
    pub version: u64,
    pub chunk_index: i64,
    /// Byte range into the document body.
    pub start_offset: i64,
    pub end_offset: i64,
    pub text: String,
    /// SHA-256 of the text, used to skip redundant embedding calls.
    pub hash: String,
}

/// Per-chunk metadata carried inside the index generations. This is what
/// facet filters are evaluated against, so both retrieval paths can
/// pre-filter without a store round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub chunk_id: String,
    pub document_id: String,
    pub version: u64,
    pub source_type: SourceType,
    pub committee: String,
    pub case_number: String,
    pub published_at: i64,
    /// Set when a newer version of the owning document became current.
    /// Retired chunks are excluded from default retrieval but remain
    /// reachable with an explicit include-superseded filter.
    pub superseded: bool,
    /// Authoritative enrichment facets (confidence above threshold only).
    pub tags: Vec<(String, String)>,
}

/// Facet filter applied as a hard pre-filter on both retrieval paths.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Match any of these committees (empty = all).
    pub committees: Vec<String>,
    /// Match any of these source types (empty = all).
    pub source_types: Vec<SourceType>,
    /// Match any of these case numbers (empty = all).
    pub case_numbers: Vec<String>,
    /// Inclusive publication-date bounds, epoch seconds.
    pub published_after: Option<i64>,
    pub published_before: Option<i64>,
    /// Require all of these authoritative enrichment facets.
    pub tags: Vec<(String, String)>,
    /// Include chunks of superseded document versions.
    pub include_superseded: bool,
}

impl SearchFilter {
    pub fn matches(&self, meta: &ChunkMeta) -> bool {
        if meta.superseded && !self.include_superseded {
            return false;
        }
        if !self.committees.is_empty() && !self.committees.iter().any(|c| c == &meta.committee) {
            return false;
        }
        if !self.source_types.is_empty() && !self.source_types.contains(&meta.source_type) {
            return false;
        }
        if !self.case_numbers.is_empty() && !self.case_numbers.iter().any(|c| c == &meta.case_number)
        {
            return false;
        }
        if let Some(after) = self.published_after {
            if meta.published_at < after {
                return false;
            }
        }
        if let Some(before) = self.published_before {
            if meta.published_at > before {
                return false;
            }
        }
        self.tags
            .iter()
            .all(|want| meta.tags.iter().any(|have| have == want))
    }
}

/// Deterministic ordering shared by both retrieval paths and the fusion
/// step: score descending, then publication date descending, then chunk id
/// ascending.
pub fn rank_ordering(
    a_score: f64,
    a_meta: &ChunkMeta,
    b_score: f64,
    b_meta: &ChunkMeta,
) -> std::cmp::Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then(b_meta.published_at.cmp(&a_meta.published_at))
        .then(a_meta.chunk_id.cmp(&b_meta.chunk_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(chunk_id: &str, committee: &str, published_at: i64) -> ChunkMeta {
        ChunkMeta {
            chunk_id: chunk_id.to_string(),
            document_id: "d1".to_string(),
            version: 1,
            source_type: SourceType::Minutes,
            committee: committee.to_string(),
            case_number: "SAG-2024-1".to_string(),
            published_at,
            superseded: false,
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_empty_filter_matches_open_chunks() {
        let filter = SearchFilter::default();
        assert!(filter.matches(&meta("c1", "Byrådet", 100)));
    }

    #[test]
    fn test_default_filter_excludes_superseded() {
        let filter = SearchFilter::default();
        let mut m = meta("c1", "Byrådet", 100);
        m.superseded = true;
        assert!(!filter.matches(&m));

        let include = SearchFilter {
            include_superseded: true,
            ..Default::default()
        };
        assert!(include.matches(&m));
    }

    #[test]
    fn test_committee_filter() {
        let filter = SearchFilter {
            committees: vec!["Teknisk Udvalg".to_string()],
            ..Default::default()
        };
        assert!(filter.matches(&meta("c1", "Teknisk Udvalg", 100)));
        assert!(!filter.matches(&meta("c2", "Byrådet", 100)));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let filter = SearchFilter {
            published_after: Some(100),
            published_before: Some(200),
            ..Default::default()
        };
        assert!(filter.matches(&meta("c1", "Byrådet", 100)));
        assert!(filter.matches(&meta("c2", "Byrådet", 200)));
        assert!(!filter.matches(&meta("c3", "Byrådet", 99)));
        assert!(!filter.matches(&meta("c4", "Byrådet", 201)));
    }

    #[test]
    fn test_tag_filter_requires_all() {
        let filter = SearchFilter {
            tags: vec![("enrich:decision".to_string(), "approved".to_string())],
            ..Default::default()
        };
        let mut m = meta("c1", "Byrådet", 100);
        assert!(!filter.matches(&m));
        m.tags
            .push(("enrich:decision".to_string(), "approved".to_string()));
        assert!(filter.matches(&m));
    }

    #[test]
    fn test_rank_ordering_tie_break() {
        let newer = meta("c2", "Byrådet", 200);
        let older = meta("c1", "Byrådet", 100);
        // Equal scores: newer publication date first.
        assert_eq!(
            rank_ordering(1.0, &older, 1.0, &newer),
            std::cmp::Ordering::Greater
        );
        // Equal score and date: chunk id ascending.
        let a = meta("a", "Byrådet", 100);
        let b = meta("b", "Byrådet", 100);
        assert_eq!(rank_ordering(1.0, &a, 1.0, &b), std::cmp::Ordering::Less);
        // Higher score always first.
        assert_eq!(
            rank_ordering(2.0, &older, 1.0, &newer),
            std::cmp::Ordering::Less
        );
    }
}
