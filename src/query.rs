//! Hybrid query engine: concurrent lexical + vector retrieval with
//! weighted score fusion.
//!
//! Both signals run concurrently against an oversampled candidate pool,
//! each under its own deadline. Scores are normalized per signal (min-max
//! or z-score) to a common scale, then fused as
//! `score = alpha·lexical + (1-alpha)·vector`. A signal that times out or
//! fails degrades the response to single-signal results flagged as
//! partial; only when every attempted signal fails does the query surface
//! [`Error::RetrievalUnavailable`].
//!
//! Facet filters ride into both index searches as hard pre-filters.
//! Results carry a snippet and full provenance (document id, committee,
//! case number, publication date) — never omitted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::lexical::{tokenize, LexicalIndex};
use crate::models::{rank_ordering, ChunkMeta, SearchFilter};
use crate::snippet::extract_snippet;
use crate::store::DocumentStore;
use crate::vector::VectorIndex;

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub text: String,
    pub filter: SearchFilter,
    /// Result count; 0 falls back to the configured final limit.
    pub k: usize,
    /// Pagination offset into the fused ranking.
    pub offset: usize,
    /// Per-query fusion weight override.
    pub alpha: Option<f64>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            filter: SearchFilter::default(),
            k: 0,
            offset: 0,
            alpha: None,
        }
    }
}

/// Where each result's provenance comes from; never omitted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Provenance {
    pub document_id: String,
    pub version: u64,
    pub committee: String,
    pub case_number: String,
    /// ISO-8601 date of publication.
    pub published_at: String,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub chunk_id: String,
    pub score: f64,
    pub lexical_score: Option<f64>,
    pub vector_score: Option<f64>,
    pub snippet: String,
    pub provenance: Provenance,
    pub superseded: bool,
}

#[derive(Debug)]
pub struct QueryResponse {
    pub results: Vec<QueryResult>,
    /// Size of the fused candidate pool before pagination.
    pub total_candidates: usize,
    /// True when a retrieval signal failed or timed out and the ranking
    /// was fused from what completed. Always distinguishable from a fully
    /// fused response.
    pub partial: bool,
    /// Names of the signals that did not contribute.
    pub degraded_signals: Vec<&'static str>,
}

enum SignalOutcome {
    Hits(Vec<(ChunkMeta, f64)>),
    Skipped,
    Failed(&'static str),
}

pub struct QueryEngine {
    store: DocumentStore,
    lexical: Arc<LexicalIndex>,
    vector: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
    ef_search: usize,
}

impl QueryEngine {
    pub fn new(
        store: DocumentStore,
        lexical: Arc<LexicalIndex>,
        vector: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
        ef_search: usize,
    ) -> Self {
        Self {
            store,
            lexical,
            vector,
            embedder,
            config,
            ef_search,
        }
    }

    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        if request.text.trim().is_empty() {
            return Err(Error::InvalidQuery("query text cannot be empty".into()));
        }
        let alpha = request.alpha.unwrap_or(self.config.alpha);
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::InvalidQuery(format!(
                "alpha must be in [0, 1], got {alpha}"
            )));
        }

        let k = if request.k == 0 {
            self.config.final_limit
        } else {
            request.k
        };
        let pool = self.config.oversample * (k + request.offset);
        let deadline = Duration::from_millis(self.config.signal_timeout_ms);

        // alpha pins a signal's weight to zero: don't spend its budget,
        // and don't let zero-weighted candidates perturb the pure ranking.
        let want_lexical = alpha > 0.0;
        let want_vector = alpha < 1.0 && self.embedder.dims() > 0;
        if !want_lexical && !want_vector {
            return Err(Error::RetrievalUnavailable(
                "no retrieval signal available: alpha selects vector-only but no embedding provider is configured".into(),
            ));
        }

        let lexical_fut = self.lexical_signal(&request, pool, deadline, want_lexical);
        let vector_fut = self.vector_signal(&request, pool, deadline, want_vector);
        let (lexical_outcome, vector_outcome) = tokio::join!(lexical_fut, vector_fut);

        let mut degraded = Vec::new();
        let mut attempted = 0;
        let mut failed = 0;

        let lexical_hits = match lexical_outcome {
            SignalOutcome::Hits(hits) => {
                attempted += 1;
                hits
            }
            SignalOutcome::Skipped => Vec::new(),
            SignalOutcome::Failed(reason) => {
                attempted += 1;
                failed += 1;
                degraded.push(reason);
                Vec::new()
            }
        };
        let vector_hits = match vector_outcome {
            SignalOutcome::Hits(hits) => {
                attempted += 1;
                hits
            }
            SignalOutcome::Skipped => Vec::new(),
            SignalOutcome::Failed(reason) => {
                attempted += 1;
                failed += 1;
                degraded.push(reason);
                Vec::new()
            }
        };

        if attempted > 0 && failed == attempted {
            return Err(Error::RetrievalUnavailable(format!(
                "all retrieval signals failed: {}",
                degraded.join(", ")
            )));
        }

        debug!(
            lexical = lexical_hits.len(),
            vector = vector_hits.len(),
            pool,
            "fusing candidates"
        );

        let fused = fuse(
            lexical_hits,
            vector_hits,
            alpha,
            &self.config.normalization,
        );
        let total_candidates = fused.len();

        let page: Vec<FusedHit> = fused
            .into_iter()
            .skip(request.offset)
            .take(k)
            .collect();

        let terms = tokenize(&request.text);
        let mut results = Vec::with_capacity(page.len());
        for hit in page {
            let text = match self.store.chunk(&hit.meta.chunk_id).await? {
                Some(chunk) => chunk.text,
                None => {
                    // Index points at a chunk the store no longer has; the
                    // ranking survives, the divergence is surfaced for the
                    // next rebuild.
                    warn!(chunk_id = %hit.meta.chunk_id, "indexed chunk missing from store");
                    continue;
                }
            };

            let snippet = extract_snippet(
                &terms,
                &text,
                self.config.snippet_chars,
                self.config.snippet_overlap,
            );

            results.push(QueryResult {
                chunk_id: hit.meta.chunk_id.clone(),
                score: hit.score,
                lexical_score: hit.lexical,
                vector_score: hit.vector,
                snippet,
                provenance: Provenance {
                    document_id: hit.meta.document_id.clone(),
                    version: hit.meta.version,
                    committee: hit.meta.committee.clone(),
                    case_number: hit.meta.case_number.clone(),
                    published_at: format_date(hit.meta.published_at),
                },
                superseded: hit.meta.superseded,
            });
        }

        Ok(QueryResponse {
            results,
            total_candidates,
            partial: failed > 0,
            degraded_signals: degraded,
        })
    }

    async fn lexical_signal(
        &self,
        request: &QueryRequest,
        pool: usize,
        deadline: Duration,
        wanted: bool,
    ) -> SignalOutcome {
        if !wanted {
            return SignalOutcome::Skipped;
        }

        let index = Arc::clone(&self.lexical);
        let text = request.text.clone();
        let filter = request.filter.clone();

        let task =
            tokio::task::spawn_blocking(move || index.search(&text, &filter, pool));

        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(hits)) => SignalOutcome::Hits(hits),
            Ok(Err(e)) => {
                warn!(error = %e, "lexical search task failed");
                SignalOutcome::Failed("lexical")
            }
            Err(_) => {
                warn!("lexical search missed its deadline");
                SignalOutcome::Failed("lexical")
            }
        }
    }

    async fn vector_signal(
        &self,
        request: &QueryRequest,
        pool: usize,
        deadline: Duration,
        wanted: bool,
    ) -> SignalOutcome {
        if !wanted {
            return SignalOutcome::Skipped;
        }

        let result = tokio::time::timeout(deadline, async {
            let query_vector = embed_query(self.embedder.as_ref(), &request.text).await?;

            let index = Arc::clone(&self.vector);
            let filter = request.filter.clone();
            let ef = self.ef_search;
            tokio::task::spawn_blocking(move || index.search(&query_vector, &filter, pool, ef))
                .await
                .map_err(|e| Error::RetrievalUnavailable(e.to_string()))?
        })
        .await;

        match result {
            Ok(Ok(hits)) => SignalOutcome::Hits(hits),
            Ok(Err(e)) => {
                warn!(error = %e, "vector search failed");
                SignalOutcome::Failed("vector")
            }
            Err(_) => {
                warn!("vector search missed its deadline");
                SignalOutcome::Failed("vector")
            }
        }
    }
}

struct FusedHit {
    meta: ChunkMeta,
    score: f64,
    lexical: Option<f64>,
    vector: Option<f64>,
}

/// Normalize both candidate lists to a common scale, union them by chunk,
/// and interpolate with `alpha`. Output is fully ordered by the shared
/// tie-break.
fn fuse(
    lexical: Vec<(ChunkMeta, f64)>,
    vector: Vec<(ChunkMeta, f64)>,
    alpha: f64,
    normalization: &str,
) -> Vec<FusedHit> {
    let lexical_norm = normalize(&lexical, normalization);
    let vector_norm = normalize(&vector, normalization);

    struct Entry {
        meta: ChunkMeta,
        lexical: Option<f64>,
        vector: Option<f64>,
    }

    let mut merged: HashMap<String, Entry> = HashMap::new();

    for ((meta, _), norm) in lexical.into_iter().zip(lexical_norm) {
        merged.insert(
            meta.chunk_id.clone(),
            Entry {
                meta,
                lexical: Some(norm),
                vector: None,
            },
        );
    }
    for ((meta, _), norm) in vector.into_iter().zip(vector_norm) {
        merged
            .entry(meta.chunk_id.clone())
            .and_modify(|e| e.vector = Some(norm))
            .or_insert(Entry {
                meta,
                lexical: None,
                vector: Some(norm),
            });
    }

    let mut fused: Vec<FusedHit> = merged
        .into_values()
        .map(|entry| {
            let score = alpha * entry.lexical.unwrap_or(0.0)
                + (1.0 - alpha) * entry.vector.unwrap_or(0.0);
            FusedHit {
                meta: entry.meta,
                score,
                lexical: entry.lexical,
                vector: entry.vector,
            }
        })
        .collect();

    fused.sort_by(|a, b| rank_ordering(a.score, &a.meta, b.score, &b.meta));
    fused
}

/// Per-signal score normalization. `minmax` maps onto [0, 1] (a constant
/// list maps to 1.0); `zscore` centers on the mean in standard deviations.
fn normalize(hits: &[(ChunkMeta, f64)], strategy: &str) -> Vec<f64> {
    if hits.is_empty() {
        return Vec::new();
    }

    match strategy {
        "zscore" => {
            let n = hits.len() as f64;
            let mean = hits.iter().map(|(_, s)| s).sum::<f64>() / n;
            let variance = hits.iter().map(|(_, s)| (s - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            hits.iter()
                .map(|(_, s)| if std < f64::EPSILON { 0.0 } else { (s - mean) / std })
                .collect()
        }
        _ => {
            let min = hits.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
            let max = hits
                .iter()
                .map(|(_, s)| *s)
                .fold(f64::NEG_INFINITY, f64::max);
            hits.iter()
                .map(|(_, s)| {
                    if (max - min).abs() < f64::EPSILON {
                        1.0
                    } else {
                        (s - min) / (max - min)
                    }
                })
                .collect()
        }
    }
}

fn format_date(epoch_seconds: i64) -> String {
    chrono::DateTime::from_timestamp(epoch_seconds, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| epoch_seconds.to_string())
}
