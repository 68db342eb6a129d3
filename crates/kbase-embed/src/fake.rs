use anyhow::Result;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use kbase_core::traits::{CrossEncoder, Embedder};

/// Hashing embedder: each whitespace token lands in a bucket, then the vector
/// is L2-normalised. Deterministic, no weights needed.
#[derive(Debug, Clone)]
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        512
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Scores a pair by the share of the query's distinct characters that also
/// occur in the passage, in `[0, 1]`.
#[derive(Debug, Clone, Default)]
pub struct FakeCrossEncoder;

impl FakeCrossEncoder {
    pub fn overlap(query: &str, passage: &str) -> f32 {
        let query_chars: HashSet<char> = query.chars().filter(|c| !c.is_whitespace()).flat_map(char::to_lowercase).collect();
        if query_chars.is_empty() {
            return 0.0;
        }
        let passage_chars: HashSet<char> = passage.chars().flat_map(char::to_lowercase).collect();
        let shared = query_chars.iter().filter(|c| passage_chars.contains(c)).count();
        shared as f32 / query_chars.len() as f32
    }
}

impl CrossEncoder for FakeCrossEncoder {
    fn score(&self, pairs: &[(&str, &str)]) -> Result<Vec<f32>> {
        Ok(pairs.iter().map(|&(q, p)| Self::overlap(q, p)).collect())
    }
}
