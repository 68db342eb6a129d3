use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use kbase_core::traits::VectorIndexer;
use kbase_core::types::{Chunk, SearchHit, SourceKind};

#[derive(Default)]
struct Rows {
	chunks: Vec<Chunk>,
	vectors: Vec<Vec<f32>>,
	positions: HashMap<String, usize>,
}

impl Rows {
	fn upsert(&mut self, chunks: &[Chunk], embeddings: &[Vec<f32>]) {
		for (chunk, vector) in chunks.iter().zip(embeddings) {
			match self.positions.get(&chunk.id).copied() {
				Some(i) => {
					self.chunks[i] = chunk.clone();
					self.vectors[i] = vector.clone();
				}
				None => {
					self.positions.insert(chunk.id.clone(), self.chunks.len());
					self.chunks.push(chunk.clone());
					self.vectors.push(vector.clone());
				}
			}
		}
	}

	fn retain(&mut self, keep: impl Fn(&Chunk) -> bool) {
		let rows = std::mem::take(&mut self.chunks).into_iter().zip(std::mem::take(&mut self.vectors));
		let (chunks, vectors): (Vec<Chunk>, Vec<Vec<f32>>) = rows.filter(|(c, _)| keep(c)).unzip();
		self.positions = chunks.iter().enumerate().map(|(i, c)| (c.id.clone(), i)).collect();
		self.chunks = chunks;
		self.vectors = vectors;
	}
}

/// Brute-force cosine index kept in memory.
#[derive(Default)]
pub struct MemoryVectorIndex {
	rows: RwLock<Rows>,
}

impl MemoryVectorIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.rows.read().chunks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[async_trait]
impl VectorIndexer for MemoryVectorIndex {
	async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
		if chunks.len() != embeddings.len() {
			bail!("{} chunks but {} embeddings", chunks.len(), embeddings.len());
		}
		self.rows.write().upsert(chunks, embeddings);
		Ok(())
	}

	async fn replace_source(&self, source: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
		if chunks.len() != embeddings.len() {
			bail!("{} chunks but {} embeddings", chunks.len(), embeddings.len());
		}
		let current: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
		let mut rows = self.rows.write();
		rows.upsert(chunks, embeddings);
		rows.retain(|c| c.meta.source != source || current.contains(c.id.as_str()));
		Ok(())
	}

	async fn query(&self, vector: &[f32], n: usize) -> Result<Vec<SearchHit>> {
		if n == 0 {
			return Ok(Vec::new());
		}
		let rows = self.rows.read();
		let mut scored: Vec<(usize, f32)> =
			rows.vectors.iter().enumerate().map(|(i, v)| (i, cosine(vector, v))).collect();
		scored.sort_by(|a, b| b.1.total_cmp(&a.1));
		scored.truncate(n);
		Ok(scored
			.into_iter()
			.map(|(i, score)| SearchHit { chunk: rows.chunks[i].clone(), score, source: SourceKind::Vector })
			.collect())
	}
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() {
		return 0.0;
	}
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
	if na == 0.0 || nb == 0.0 {
		0.0
	} else {
		dot / (na * nb)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use kbase_core::types::ChunkMeta;

	fn chunk(id: &str, text: &str) -> Chunk {
		Chunk::new(id, text, ChunkMeta::new("s.pdf", 1))
	}

	#[tokio::test]
	async fn nearest_first_and_bounded() {
		let index = MemoryVectorIndex::new();
		index
			.upsert(
				&[chunk("a", "a"), chunk("b", "b"), chunk("c", "c")],
				&[vec![1.0, 0.0], vec![0.7, 0.7], vec![0.0, 1.0]],
			)
			.await
			.unwrap();
		let hits = index.query(&[1.0, 0.1], 2).await.unwrap();
		let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
		assert_eq!(ids, vec!["a", "b"]);
		assert!(hits[0].score >= hits[1].score);
		assert!(index.query(&[1.0, 0.0], 0).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn upsert_replaces_by_id() {
		let index = MemoryVectorIndex::new();
		index.upsert(&[chunk("a", "old")], &[vec![1.0, 0.0]]).await.unwrap();
		index.upsert(&[chunk("a", "new")], &[vec![0.0, 1.0]]).await.unwrap();
		assert_eq!(index.len(), 1);
		let hits = index.query(&[0.0, 1.0], 5).await.unwrap();
		assert_eq!(hits[0].chunk.content, "new");
	}

	#[tokio::test]
	async fn replace_source_drops_stale_rows_only() {
		let index = MemoryVectorIndex::new();
		let other = Chunk::new("guide_p1_c0", "guide", ChunkMeta::new("guide.txt", 1));
		index
			.upsert(&[chunk("s_p1_c0", "one"), chunk("s_p2_c0", "two"), other], &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]])
			.await
			.unwrap();
		index.replace_source("s.pdf", &[chunk("s_p1_c0", "one again")], &[vec![1.0, 0.0]]).await.unwrap();
		assert_eq!(index.len(), 2);
		let hits = index.query(&[0.0, 1.0], 5).await.unwrap();
		let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
		assert_eq!(ids, vec!["guide_p1_c0", "s_p1_c0"]);
		assert_eq!(hits[1].chunk.content, "one again");
	}

	#[tokio::test]
	async fn mismatched_lengths_are_rejected() {
		let index = MemoryVectorIndex::new();
		assert!(index.upsert(&[chunk("a", "a")], &[]).await.is_err());
	}
}
