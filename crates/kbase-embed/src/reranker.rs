use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device};
use candle_transformers::models::xlm_roberta::XLMRobertaForSequenceClassification;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use kbase_core::traits::CrossEncoder;

use crate::device::select_device;
use crate::embedding::{load_config, load_tokenizer, load_weights};
use crate::tokenize::tokenize_pairs;

const SLOW_MS_PER_PAIR: u128 = 50;

/// bge-reranker style cross-encoder: one relevance logit per (query, passage).
pub struct CrossEncoderModel {
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
}

impl CrossEncoderModel {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading reranker model");
        let tokenizer = load_tokenizer(model_dir)?;
        let (config, _) = load_config(model_dir)?;
        let vb = load_weights(model_dir, &device)?;
        let model = XLMRobertaForSequenceClassification::new(1, &config, vb)?;
        info!("reranker model loaded");
        Ok(Self { model, tokenizer, device, max_len })
    }
}

impl CrossEncoder for CrossEncoderModel {
    fn score(&self, pairs: &[(&str, &str)]) -> Result<Vec<f32>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_pairs(&self.tokenizer, pairs, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let logits = self.model.forward(&input_ids, &attention_mask, &token_type_ids)?;
        let scores: Vec<f32> = logits.squeeze(1)?.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec1()?;
        if scores.len() != pairs.len() {
            return Err(anyhow!("reranker returned {} scores for {} pairs", scores.len(), pairs.len()));
        }
        let ms = start.elapsed().as_millis();
        if ms > SLOW_MS_PER_PAIR * pairs.len() as u128 {
            warn!(pairs = pairs.len(), ms, "slow rerank");
        } else {
            debug!(pairs = pairs.len(), ms, "reranked batch");
        }
        Ok(scores)
    }
}
