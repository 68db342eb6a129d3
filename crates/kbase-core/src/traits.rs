use async_trait::async_trait;

use crate::types::{Chunk, SearchHit};

/// Text → fixed-length vector. Deterministic for a given model.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Pairwise relevance model. Returns one score per `(query, passage)` pair,
/// higher is more relevant; the scale is model-specific.
pub trait CrossEncoder: Send + Sync {
    fn score(&self, pairs: &[(&str, &str)]) -> anyhow::Result<Vec<f32>>;
}

pub trait TextIndexer: Send + Sync {
    /// Insert or replace by `Chunk::id`.
    fn add_documents(&self, chunks: &[Chunk]) -> anyhow::Result<()>;
    /// Remove every chunk whose `meta.source` is `source`, then insert `chunks`.
    fn replace_source(&self, source: &str, chunks: &[Chunk]) -> anyhow::Result<()>;
    fn search(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<SearchHit>>;
}

#[async_trait]
pub trait VectorIndexer: Send + Sync {
    /// Insert or replace by `Chunk::id`.
    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> anyhow::Result<()>;
    /// Upsert `chunks`, then remove the rows of `source` not among them.
    async fn replace_source(&self, source: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> anyhow::Result<()>;
    /// Nearest neighbours, best first.
    async fn query(&self, vector: &[f32], n: usize) -> anyhow::Result<Vec<SearchHit>>;
}
