//! Error taxonomy for the dagsorden library.
//!
//! Library code returns typed errors so callers can react to the category
//! (retry a transient failure, trigger a rebuild on inconsistency, surface
//! a conflict). The CLI boundary converts these into `anyhow` context.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Unknown document id or version.
    #[error("not found: {0}")]
    NotFound(String),

    /// An out-of-order version write: a lower version was submitted after a
    /// higher one is already current. The higher version stays current.
    #[error("version conflict for document {id}: submitted v{submitted}, current v{current}")]
    Conflict {
        id: String,
        submitted: u64,
        current: u64,
    },

    /// Transient failure talking to the publication feed or an attachment
    /// fetch. Retried with backoff by the pipeline.
    #[error("transient source failure: {0}")]
    TransientSource(String),

    /// Embedding provider failure. Transient; retried, and a chunk without
    /// an embedding stays searchable through the lexical path.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Enrichment failure. Non-fatal: logged and skipped, never blocks
    /// indexing.
    #[error("enrichment failed: {0}")]
    Enrichment(String),

    /// A derived index diverged from the document store. Fatal to the
    /// affected index generation only; remedied by a rebuild.
    #[error("index inconsistency in {index}: {detail}")]
    IndexInconsistency { index: &'static str, detail: String },

    /// Both retrieval signals failed for a query.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("index snapshot error: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the pipeline should retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientSource(_) | Error::Embedding(_))
    }
}
