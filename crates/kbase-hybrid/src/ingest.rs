use std::sync::Arc;
use tracing::{info, warn};

use kbase_core::config::IngestSettings;
use kbase_core::error::{Error, Result};
use kbase_core::splitter::TextSplitter;
use kbase_core::traits::{Embedder, TextIndexer, VectorIndexer};
use kbase_core::types::Chunk;

/// Splits extracted pages into chunks and writes them to both indexes.
pub struct Ingestor<T: ?Sized, V: ?Sized> {
    text: Arc<T>,
    vector: Arc<V>,
    embedder: Arc<dyn Embedder>,
    splitter: TextSplitter,
    batch_size: usize,
}

impl<T, V> Ingestor<T, V>
where
    T: TextIndexer + ?Sized + 'static,
    V: VectorIndexer + ?Sized + 'static,
{
    pub fn new(text: Arc<T>, vector: Arc<V>, embedder: Arc<dyn Embedder>, settings: &IngestSettings) -> Self {
        Self {
            text,
            vector,
            embedder,
            splitter: TextSplitter::from_settings(settings),
            batch_size: settings.embed_batch_size.max(1),
        }
    }

    /// Ingest `(page, text)` pairs of one source; returns the chunk count.
    ///
    /// The new revision supersedes the source: chunks it no longer produces
    /// are removed from both indexes. Input that yields no chunks leaves both
    /// indexes untouched. See [`Ingestor::ingest_chunks`] for write order.
    pub async fn ingest(&self, source: &str, pages: &[(u32, String)]) -> Result<usize> {
        let chunks = self.splitter.split_pages(source, pages);
        let count = self.write(Some(source), chunks).await?;
        info!(source, pages = pages.len(), chunks = count, "ingested");
        Ok(count)
    }

    /// Upsert chunks by id into both indexes.
    ///
    /// Embeddings are computed before anything is written. The lexical index
    /// is written first and the vector index second; if the vector write
    /// fails the lexical side already holds the new chunks, which is logged,
    /// and repeating the same ingest converges both indexes.
    pub async fn ingest_chunks(&self, chunks: Vec<Chunk>) -> Result<usize> {
        self.write(None, chunks).await
    }

    async fn write(&self, source: Option<&str>, chunks: Vec<Chunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let embeddings = self.embed_all(&chunks).await?;

        let text = Arc::clone(&self.text);
        let lexical_chunks = chunks.clone();
        let lexical_source = source.map(str::to_string);
        tokio::task::spawn_blocking(move || match &lexical_source {
            Some(source) => text.replace_source(source, &lexical_chunks),
            None => text.add_documents(&lexical_chunks),
        })
        .await
        .map_err(|e| Error::Operation(format!("lexical task failed: {e}")))?
        .map_err(|e| Error::Persistence(format!("lexical index update failed: {e:#}")))?;

        let written = match source {
            Some(source) => self.vector.replace_source(source, &chunks, &embeddings).await,
            None => self.vector.upsert(&chunks, &embeddings).await,
        };
        if let Err(e) = written {
            warn!(source = source.unwrap_or("-"), chunks = chunks.len(), error = %format!("{e:#}"), "vector write failed after the lexical index was updated");
            return Err(Error::Operation(format!("vector upsert failed: {e:#}")));
        }
        Ok(chunks.len())
    }

    async fn embed_all(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let embedder = Arc::clone(&self.embedder);
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let batch_size = self.batch_size;
        tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let dim = embedder.dim();
            let mut out = Vec::with_capacity(texts.len());
            for batch in texts.chunks(batch_size) {
                let vectors = embedder.embed_batch(batch).map_err(|e| Error::Scoring(format!("embedding failed: {e:#}")))?;
                if vectors.len() != batch.len() {
                    return Err(Error::Scoring(format!("embedder returned {} vectors for {} texts", vectors.len(), batch.len())));
                }
                if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
                    return Err(Error::Scoring(format!("embedding has {} dims, expected {dim}", bad.len())));
                }
                out.extend(vectors);
            }
            Ok(out)
        })
        .await
        .map_err(|e| Error::Operation(format!("embedding task failed: {e}")))?
    }
}
