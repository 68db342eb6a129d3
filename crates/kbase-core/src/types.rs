//! Domain types used by the lexical and vector engines.

use serde::{Deserialize, Serialize};

/// Stable chunk identity, `{source}_p{page}_c{index}` for ingested chunks.
pub type ChunkId = String;

/// Provenance of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub source: String,
    pub page: u32,
}

impl ChunkMeta {
    pub fn new(source: impl Into<String>, page: u32) -> Self {
        Self { source: source.into(), page }
    }
}

/// An immutable unit of retrievable text.
///
/// - `id`: identity carried through both retrieval paths; two chunks with
///   identical `content` but different ids are different candidates
/// - `content`: the text payload
/// - `meta`: originating document and page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub content: String,
    pub meta: ChunkMeta,
}

impl Chunk {
    pub fn new(id: impl Into<ChunkId>, content: impl Into<String>, meta: ChunkMeta) -> Self {
        Self { id: id.into(), content: content.into(), meta }
    }
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Vector,
    Text,
}

/// A ranked hit returned by one engine.
///
/// Position in the returned list is the rank. `score` is engine-specific
/// (cosine similarity, BM25) and only meaningful within that list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
    pub source: SourceKind,
}
