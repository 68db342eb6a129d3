use std::sync::Arc;
use tracing::debug;

use kbase_core::error::{Error, Result};
use kbase_core::traits::CrossEncoder;
use kbase_core::types::Chunk;

use crate::fusion::FusedCandidate;

/// A final result, carrying the reranker's own score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub chunk: Chunk,
    pub score: f32,
}

/// Fine ranking over the head of the fused list.
#[derive(Clone)]
pub struct RerankStage {
    scorer: Arc<dyn CrossEncoder>,
    cutoff: usize,
}

impl RerankStage {
    pub fn new(scorer: Arc<dyn CrossEncoder>, cutoff: usize) -> Self {
        Self { scorer, cutoff }
    }

    pub fn cutoff(&self) -> usize {
        self.cutoff
    }

    /// Score the first `cutoff` candidates against `query` in one batch and
    /// keep the best `final_k`. Nothing to score means no scorer call.
    pub fn rerank(&self, query: &str, candidates: &[FusedCandidate], final_k: usize) -> Result<Vec<ScoredCandidate>> {
        let head = &candidates[..candidates.len().min(self.cutoff)];
        if head.is_empty() || final_k == 0 {
            return Ok(Vec::new());
        }

        let pairs: Vec<(&str, &str)> = head.iter().map(|c| (query, c.chunk.content.as_str())).collect();
        let scores = self.scorer.score(&pairs).map_err(|e| Error::Scoring(format!("{e:#}")))?;
        if scores.len() != head.len() {
            return Err(Error::Scoring(format!("reranker returned {} scores for {} candidates", scores.len(), head.len())));
        }
        if scores.iter().any(|s| s.is_nan()) {
            return Err(Error::Scoring("reranker returned NaN".to_string()));
        }

        let mut ranked: Vec<ScoredCandidate> = head
            .iter()
            .zip(scores)
            .map(|(c, score)| ScoredCandidate { chunk: c.chunk.clone(), score })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(final_k);
        debug!(scored = head.len(), kept = ranked.len(), "reranked");
        Ok(ranked)
    }
}
