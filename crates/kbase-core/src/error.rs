use std::time::Duration;
use thiserror::Error;

/// Request-level failures surfaced by ingestion and retrieval.
///
/// An empty ranking is not an error; see `SearchOutcome` in `kbase-hybrid`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Both retrieval sources failed for the same request.
    #[error("Retrieval failed (dense: {dense}; lexical: {lexical})")]
    RetrievalFailed { dense: String, lexical: String },

    /// Embedding or reranker call failed.
    #[error("Scoring failed: {0}")]
    Scoring(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
