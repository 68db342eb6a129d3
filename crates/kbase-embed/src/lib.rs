//! kbase-embed
//!
//! Scoring adapters backed by candle: the BGE-M3 dense encoder and a
//! bge-reranker cross-encoder, plus deterministic fakes selected with
//! `APP_USE_FAKE_EMBEDDINGS=1` so nothing needs model weights in tests.

pub mod device;
pub mod embedding;
pub mod fake;
pub mod pool;
pub mod reranker;
pub mod tokenize;

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use kbase_core::config::{expand_path, ModelSettings};
use kbase_core::traits::{CrossEncoder, Embedder};

pub use embedding::EmbeddingModel;
pub use fake::{FakeCrossEncoder, FakeEmbedder};
pub use pool::masked_mean_l2;
pub use reranker::CrossEncoderModel;

/// Dimension of BGE-M3 dense vectors, also used by the fake embedder.
pub const DEFAULT_DIM: usize = 1024;

pub fn use_fake_models() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn get_default_embedder(settings: &ModelSettings) -> Result<Arc<dyn Embedder>> {
    if use_fake_models() {
        info!("using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(DEFAULT_DIM)));
    }
    let dir = resolve_model_dir(settings.embedding_dir.as_deref(), &["APP_MODEL_DIR", "MODEL_DIR"], "bge-m3")?;
    Ok(Arc::new(EmbeddingModel::load(&dir, settings.max_len)?))
}

pub fn get_default_reranker(settings: &ModelSettings) -> Result<Arc<dyn CrossEncoder>> {
    if use_fake_models() {
        info!("using FakeCrossEncoder");
        return Ok(Arc::new(FakeCrossEncoder));
    }
    let dir = resolve_model_dir(settings.reranker_dir.as_deref(), &["APP_RERANKER_DIR"], "bge-reranker-base")?;
    Ok(Arc::new(CrossEncoderModel::load(&dir, settings.max_len)?))
}

/// First existing directory among: the configured path, the given env vars,
/// `../models/<name>` and `models/<name>`.
pub fn resolve_model_dir(configured: Option<&str>, env_keys: &[&str], name: &str) -> Result<PathBuf> {
    if let Some(dir) = configured {
        let p = expand_path(dir);
        if p.exists() {
            info!(dir = %p.display(), "using configured model dir");
            return Ok(p);
        }
        return Err(anyhow!("Configured model directory {} does not exist", p.display()));
    }
    for key in env_keys {
        if let Ok(dir) = std::env::var(key) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                info!(dir = %p.display(), "using {key}");
                return Ok(p);
            }
        }
    }
    for root in ["../models", "models"] {
        let p = Path::new(root).join(name);
        if p.exists() {
            info!(dir = %p.display(), "using model dir");
            return Ok(p);
        }
    }
    Err(anyhow!("Could not locate {} model directory", name))
}
