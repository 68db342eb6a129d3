//! Reciprocal-rank fusion of the dense and lexical candidate lists.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use kbase_core::config::DEFAULT_RRF_K;
use kbase_core::types::{Chunk, ChunkId, SearchHit, SourceKind};

/// A candidate of the consensus ranking.
///
/// `score` is the RRF sum and only orders candidates of one fusion call.
/// `sources` lists the engines that returned the chunk, in processing order.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub chunk: Chunk,
    pub score: f64,
    pub sources: Vec<SourceKind>,
}

/// Rank-based fusion: zero-based rank `r` contributes `1 / (k + r + 1)`,
/// raw engine scores are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusionEngine {
    k: u32,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_RRF_K)
    }
}

impl FusionEngine {
    pub fn new(k: u32) -> Self {
        Self { k }
    }

    pub fn contribution(&self, rank: usize) -> f64 {
        1.0 / (f64::from(self.k) + rank as f64 + 1.0)
    }

    /// Fold `dense` then `lexical` into one ranking keyed by chunk id.
    ///
    /// Repeated ids inside one list keep only their first (best-ranked)
    /// occurrence and later items move up. When both lists carry a chunk, the
    /// lexical copy's content and metadata win. Equal scores keep first-seen
    /// order.
    pub fn fuse(&self, dense: &[SearchHit], lexical: &[SearchHit]) -> Vec<FusedCandidate> {
        let mut order: Vec<FusedCandidate> = Vec::with_capacity(dense.len() + lexical.len());
        let mut slots: HashMap<ChunkId, usize> = HashMap::new();

        for (kind, hits) in [(SourceKind::Vector, dense), (SourceKind::Text, lexical)] {
            for (rank, hit) in dedup_by_id(hits).into_iter().enumerate() {
                let contribution = self.contribution(rank);
                match slots.get(&hit.chunk.id).copied() {
                    Some(i) => {
                        let entry = &mut order[i];
                        entry.score += contribution;
                        entry.chunk = hit.chunk.clone();
                        entry.sources.push(kind);
                    }
                    None => {
                        slots.insert(hit.chunk.id.clone(), order.len());
                        order.push(FusedCandidate { chunk: hit.chunk.clone(), score: contribution, sources: vec![kind] });
                    }
                }
            }
        }

        order.sort_by(|a, b| b.score.total_cmp(&a.score));
        debug!(dense = dense.len(), lexical = lexical.len(), fused = order.len(), k = self.k, "rrf fusion");
        order
    }
}

fn dedup_by_id(hits: &[SearchHit]) -> Vec<&SearchHit> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(hits.len());
    hits.iter().filter(|h| seen.insert(h.chunk.id.as_str())).collect()
}
