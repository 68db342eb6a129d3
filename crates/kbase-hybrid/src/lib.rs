//! kbase-hybrid
//!
//! Hybrid retrieval: reciprocal-rank fusion of dense and lexical rankings,
//! cross-encoder reranking of the fused head, the request pipeline tying
//! them together, and ingestion into both indexes.

pub mod fusion;
pub mod ingest;
pub mod pipeline;
pub mod rerank;

pub use fusion::{FusedCandidate, FusionEngine};
pub use ingest::Ingestor;
pub use pipeline::{RetrievalPipeline, SearchOutcome};
pub use rerank::{RerankStage, ScoredCandidate};
