use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use kbase_core::traits::Embedder;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

const SLOW_MS_PER_TEXT: u128 = 100;

/// BGE-M3 dense encoder: masked-mean pooled, L2-normalised hidden states.
pub struct EmbeddingModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
}

impl EmbeddingModel {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(dir = %model_dir.display(), "loading embedding model");
        let tokenizer = load_tokenizer(model_dir)?;
        let (config, hidden_size) = load_config(model_dir)?;
        let vb = load_weights(model_dir, &device)?;
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(dim = hidden_size, "embedding model loaded");
        Ok(Self { model, tokenizer, device, dim: hidden_size, max_len })
    }

    fn forward(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        if let Some(bad) = rows.iter().find(|r| r.len() != self.dim) {
            return Err(anyhow!("model produced {}-dim embedding, expected {}", bad.len(), self.dim));
        }
        Ok(rows)
    }
}

impl Embedder for EmbeddingModel {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let out = self.forward(texts)?;
        let ms = start.elapsed().as_millis();
        if ms > SLOW_MS_PER_TEXT * texts.len() as u128 {
            warn!(batch = texts.len(), ms, "slow embedding");
        } else {
            debug!(batch = texts.len(), ms, "embedded batch");
        }
        Ok(out)
    }
}

pub(crate) fn load_tokenizer(model_dir: &Path) -> Result<Tokenizer> {
    let tokenizer_path = model_dir.join("tokenizer.json");
    Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))
}

/// Parsed config plus `hidden_size`, read separately from the raw JSON.
pub(crate) fn load_config(model_dir: &Path) -> Result<(XLMRobertaConfig, usize)> {
    let config_path = model_dir.join("config.json");
    let raw = std::fs::read_to_string(&config_path)
        .map_err(|e| anyhow!("Failed to read {}: {}", config_path.display(), e))?;
    let config: XLMRobertaConfig = serde_json::from_str(&raw)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let hidden_size = value
        .get("hidden_size")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;
    Ok((config, hidden_size))
}

/// `model.safetensors` when present, `pytorch_model.bin` otherwise.
pub(crate) fn load_weights<'a>(model_dir: &Path, device: &Device) -> Result<VarBuilder<'a>> {
    let safetensors = model_dir.join("model.safetensors");
    let weights: HashMap<String, Tensor> = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, device)?
    } else {
        let pickle = model_dir.join("pytorch_model.bin");
        candle_core::pickle::read_all(&pickle)
            .map_err(|e| anyhow!("Failed to read weights from {}: {}", pickle.display(), e))?
            .into_iter()
            .collect()
    };
    Ok(VarBuilder::from_tensors(weights, DType::F32, device))
}
