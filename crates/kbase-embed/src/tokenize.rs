use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::{EncodeInput, Encoding, Tokenizer};

/// XLM-RoBERTa `<pad>` id.
pub const PAD_ID: u32 = 1;

/// Encode single texts into `(input_ids, attention_mask)`, both `[B, T]`.
pub fn tokenize_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let inputs: Vec<EncodeInput> = texts.iter().map(|t| t.as_str().into()).collect();
    encode(tokenizer, inputs, max_len, device)
}

/// Encode `(query, passage)` pairs as one sequence each, the way cross-encoders expect them.
pub fn tokenize_pairs(tokenizer: &Tokenizer, pairs: &[(&str, &str)], max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let inputs: Vec<EncodeInput> = pairs.iter().map(|&(q, p)| (q, p).into()).collect();
    encode(tokenizer, inputs, max_len, device)
}

fn encode(tokenizer: &Tokenizer, inputs: Vec<EncodeInput>, max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let batch = inputs.len();
    if batch == 0 {
        return Err(anyhow!("Tokenization called with an empty batch"));
    }
    let encodings = tokenizer.encode_batch(inputs, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let (ids, mask, width) = pad_encodings(&encodings, max_len);
    let input_ids = Tensor::from_vec(ids, (batch, width), device)?;
    let attention_mask = Tensor::from_vec(mask, (batch, width), device)?;
    Ok((input_ids, attention_mask))
}

/// Truncate to `max_len` and right-pad to the longest remaining sequence.
fn pad_encodings(encodings: &[Encoding], max_len: usize) -> (Vec<u32>, Vec<u32>, usize) {
    let width = encodings.iter().map(|e| e.get_ids().len().min(max_len)).max().unwrap_or(0).max(1);
    let mut ids = Vec::with_capacity(encodings.len() * width);
    let mut mask = Vec::with_capacity(encodings.len() * width);
    for enc in encodings {
        let n = enc.get_ids().len().min(width);
        ids.extend_from_slice(&enc.get_ids()[..n]);
        mask.extend_from_slice(&enc.get_attention_mask()[..n]);
        ids.extend(std::iter::repeat(PAD_ID).take(width - n));
        mask.extend(std::iter::repeat(0).take(width - n));
    }
    (ids, mask, width)
}
