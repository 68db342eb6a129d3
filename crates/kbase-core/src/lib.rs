//! kbase-core
//!
//! Shared vocabulary of the workspace: chunk and hit types, the scoring and
//! index traits every engine implements, the request error taxonomy,
//! configuration loading and the ingestion text splitter.

pub mod config;
pub mod error;
pub mod logging;
pub mod splitter;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use types::{Chunk, ChunkId, ChunkMeta, SearchHit, SourceKind};
