//! Coarse-to-fine retrieval: dense and lexical top-N, RRF fusion, then a
//! cross-encoder over the head of the fused list.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinError;
use tracing::{debug, warn};

use kbase_core::config::RetrievalSettings;
use kbase_core::error::{Error, Result};
use kbase_core::traits::{CrossEncoder, Embedder, TextIndexer, VectorIndexer};
use kbase_core::types::SearchHit;

use crate::fusion::FusionEngine;
use crate::rerank::{RerankStage, ScoredCandidate};

/// Result of one retrieval request. An empty ranking is a normal outcome,
/// distinct from a failed request.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(Vec<ScoredCandidate>),
    NoRelevantInformation,
}

impl SearchOutcome {
    pub fn results(&self) -> &[ScoredCandidate] {
        match self {
            SearchOutcome::Found(results) => results,
            SearchOutcome::NoRelevantInformation => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results().is_empty()
    }

    pub fn into_results(self) -> Vec<ScoredCandidate> {
        match self {
            SearchOutcome::Found(results) => results,
            SearchOutcome::NoRelevantInformation => Vec::new(),
        }
    }
}

pub struct RetrievalPipeline<T: ?Sized, V: ?Sized> {
    text: Arc<T>,
    vector: Arc<V>,
    embedder: Arc<dyn Embedder>,
    fusion: FusionEngine,
    rerank: RerankStage,
    settings: RetrievalSettings,
}

impl<T, V> RetrievalPipeline<T, V>
where
    T: TextIndexer + ?Sized + 'static,
    V: VectorIndexer + ?Sized + 'static,
{
    pub fn new(
        text: Arc<T>,
        vector: Arc<V>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn CrossEncoder>,
        settings: RetrievalSettings,
    ) -> Self {
        let fusion = FusionEngine::new(settings.rrf_k);
        let rerank = RerankStage::new(reranker, settings.rerank_cutoff);
        Self { text, vector, embedder, fusion, rerank, settings }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Search with the configured default `final_k`.
    pub async fn search_default(&self, query: &str) -> Result<SearchOutcome> {
        self.search(query, self.settings.final_k).await
    }

    /// Like [`search`](Self::search), failing with `DeadlineExceeded` once
    /// `deadline` has elapsed.
    pub async fn search_within(&self, query: &str, final_k: usize, deadline: Duration) -> Result<SearchOutcome> {
        tokio::time::timeout(deadline, self.search(query, final_k))
            .await
            .map_err(|_| Error::DeadlineExceeded(deadline))?
    }

    pub async fn search(&self, query: &str, final_k: usize) -> Result<SearchOutcome> {
        if final_k == 0 || final_k > self.settings.max_final_k {
            return Err(Error::InvalidRequest(format!(
                "final_k must be within 1..={} (got {final_k})",
                self.settings.max_final_k
            )));
        }
        let start = Instant::now();
        let query_vec = self.embed_query(query).await?;

        // Both sources run as their own tasks; fusion waits for both.
        let n = self.settings.coarse_n;
        let vector = Arc::clone(&self.vector);
        let dense_task = tokio::spawn(async move { vector.query(&query_vec, n).await });
        let text = Arc::clone(&self.text);
        let owned_query = query.to_string();
        let lexical_task = tokio::task::spawn_blocking(move || text.search(&owned_query, n));
        let (dense, lexical) = tokio::join!(dense_task, lexical_task);

        let (dense, lexical) = match (flatten(dense), flatten(lexical)) {
            (Ok(d), Ok(l)) => (d, l),
            (Ok(d), Err(e)) => {
                warn!(error = %e, "lexical retrieval failed; continuing with dense results only");
                (d, Vec::new())
            }
            (Err(e), Ok(l)) => {
                warn!(error = %e, "dense retrieval failed; continuing with lexical results only");
                (Vec::new(), l)
            }
            (Err(dense), Err(lexical)) => return Err(Error::RetrievalFailed { dense, lexical }),
        };
        debug!(dense = dense.len(), lexical = lexical.len(), "coarse retrieval done");
        if dense.is_empty() && lexical.is_empty() {
            return Ok(SearchOutcome::NoRelevantInformation);
        }

        let mut fused = self.fusion.fuse(&dense, &lexical);
        fused.truncate(self.rerank.cutoff());

        let rerank = self.rerank.clone();
        let owned_query = query.to_string();
        let results = tokio::task::spawn_blocking(move || rerank.rerank(&owned_query, &fused, final_k))
            .await
            .map_err(|e| Error::Operation(format!("rerank task failed: {e}")))??;

        debug!(results = results.len(), ms = start.elapsed().as_millis() as u64, "search finished");
        if results.is_empty() {
            Ok(SearchOutcome::NoRelevantInformation)
        } else {
            Ok(SearchOutcome::Found(results))
        }
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let texts = vec![query.to_string()];
        let mut vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .map_err(|e| Error::Operation(format!("embedding task failed: {e}")))?
            .map_err(|e| Error::Scoring(format!("query embedding failed: {e:#}")))?;
        let vector = vectors.pop().ok_or_else(|| Error::Scoring("embedder returned no vector".to_string()))?;
        if vector.len() != self.embedder.dim() {
            return Err(Error::Scoring(format!(
                "query embedding has {} dims, expected {}",
                vector.len(),
                self.embedder.dim()
            )));
        }
        Ok(vector)
    }
}

fn flatten(joined: std::result::Result<anyhow::Result<Vec<SearchHit>>, JoinError>) -> std::result::Result<Vec<SearchHit>, String> {
    match joined {
        Ok(Ok(hits)) => Ok(hits),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(e) => Err(format!("task failed: {e}")),
    }
}
