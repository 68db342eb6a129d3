use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use kbase_core::traits::TextIndexer;
use kbase_core::types::{Chunk, ChunkMeta, SearchHit, SourceKind};

use crate::analyzer::Analyzer;
use crate::bm25::Bm25;

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk form of the index: the parallel sequences, nothing derived.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
	version: u32,
	ids: Vec<String>,
	texts: Vec<String>,
	metadatas: Vec<ChunkMeta>,
	tokenized: Vec<Vec<String>>,
}

/// One immutable generation of the index. Searches hold an `Arc` to it, so
/// a concurrent add swaps in a new generation without disturbing them.
#[derive(Default)]
struct IndexState {
	ids: Vec<String>,
	texts: Vec<String>,
	metadatas: Vec<ChunkMeta>,
	tokenized: Vec<Vec<String>>,
	positions: HashMap<String, usize>,
	bm25: Bm25,
}

impl IndexState {
	fn from_parts(ids: Vec<String>, texts: Vec<String>, metadatas: Vec<ChunkMeta>, tokenized: Vec<Vec<String>>) -> Result<Self> {
		let positions = ids.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();
		let bm25 = Bm25::build(&tokenized)?;
		Ok(Self { ids, texts, metadatas, tokenized, positions, bm25 })
	}

	fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
		if snapshot.version != SNAPSHOT_VERSION {
			bail!("unsupported snapshot version {}", snapshot.version);
		}
		let n = snapshot.ids.len();
		if snapshot.texts.len() != n || snapshot.metadatas.len() != n || snapshot.tokenized.len() != n {
			bail!(
				"snapshot sequences differ in length (ids={}, texts={}, metadatas={}, tokenized={})",
				n,
				snapshot.texts.len(),
				snapshot.metadatas.len(),
				snapshot.tokenized.len()
			);
		}
		Self::from_parts(snapshot.ids, snapshot.texts, snapshot.metadatas, snapshot.tokenized)
	}

	fn to_snapshot(&self) -> Snapshot {
		Snapshot {
			version: SNAPSHOT_VERSION,
			ids: self.ids.clone(),
			texts: self.texts.clone(),
			metadatas: self.metadatas.clone(),
			tokenized: self.tokenized.clone(),
		}
	}

	fn len(&self) -> usize {
		self.ids.len()
	}
}

/// BM25 lexical index over chunks, persisted as a JSON snapshot.
///
/// Mutations are serialized by `write_lock`: the next generation is built
/// from the current one, written to disk, and only then published. A failed
/// write leaves the published generation untouched.
pub struct LexicalIndex {
	analyzer: Analyzer,
	path: Option<PathBuf>,
	state: RwLock<Arc<IndexState>>,
	write_lock: Mutex<()>,
}

impl LexicalIndex {
	/// Open the snapshot at `path`. A missing snapshot starts an empty index;
	/// an unreadable one is logged and also starts empty (it is overwritten
	/// by the next add).
	pub fn open(path: impl Into<PathBuf>) -> Self {
		let path = path.into();
		let state = if path.exists() {
			match load_snapshot(&path) {
				Ok(state) => {
					info!(path = %path.display(), docs = state.len(), "loaded lexical snapshot");
					state
				}
				Err(e) => {
					warn!(path = %path.display(), error = %format!("{e:#}"), "lexical snapshot unreadable; starting with an empty index");
					IndexState::default()
				}
			}
		} else {
			info!(path = %path.display(), "no lexical snapshot yet; starting with an empty index");
			IndexState::default()
		};
		Self::with_state(Some(path), state)
	}

	/// Index without persistence.
	pub fn in_memory() -> Self {
		Self::with_state(None, IndexState::default())
	}

	fn with_state(path: Option<PathBuf>, state: IndexState) -> Self {
		Self {
			analyzer: Analyzer::new(),
			path,
			state: RwLock::new(Arc::new(state)),
			write_lock: Mutex::new(()),
		}
	}

	pub fn path(&self) -> Option<&Path> {
		self.path.as_deref()
	}

	pub fn len(&self) -> usize {
		self.snapshot().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Lengths of the (ids, texts, metadatas, tokenized) sequences.
	pub fn sequence_lens(&self) -> (usize, usize, usize, usize) {
		let s = self.snapshot();
		(s.ids.len(), s.texts.len(), s.metadatas.len(), s.tokenized.len())
	}

	/// Add or replace chunks by id, rebuild the ranking structure and persist.
	/// Only the incoming texts are tokenized.
	pub fn add(&self, chunks: &[Chunk]) -> Result<()> {
		if chunks.is_empty() {
			return Ok(());
		}
		self.rebuild(None, chunks)
	}

	/// Drop every chunk of `source`, then add `chunks`, in one rebuild and
	/// one snapshot write.
	pub fn replace_source(&self, source: &str, chunks: &[Chunk]) -> Result<()> {
		self.rebuild(Some(source), chunks)
	}

	fn rebuild(&self, drop_source: Option<&str>, chunks: &[Chunk]) -> Result<()> {
		let _guard = self.write_lock.lock();
		let current = self.snapshot();

		let keep: Vec<usize> = (0..current.len())
			.filter(|&i| !matches!(drop_source, Some(s) if current.metadatas[i].source == s))
			.collect();
		let removed = current.len() - keep.len();
		if removed == 0 && chunks.is_empty() {
			return Ok(());
		}
		let mut ids: Vec<String> = keep.iter().map(|&i| current.ids[i].clone()).collect();
		let mut texts: Vec<String> = keep.iter().map(|&i| current.texts[i].clone()).collect();
		let mut metadatas: Vec<ChunkMeta> = keep.iter().map(|&i| current.metadatas[i].clone()).collect();
		let mut tokenized: Vec<Vec<String>> = keep.iter().map(|&i| current.tokenized[i].clone()).collect();
		let mut positions: HashMap<String, usize> = ids.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();

		let (mut added, mut replaced) = (0usize, 0usize);
		for chunk in chunks {
			let tokens = self.analyzer.tokenize(&chunk.content);
			match positions.get(&chunk.id).copied() {
				Some(i) => {
					texts[i] = chunk.content.clone();
					metadatas[i] = chunk.meta.clone();
					tokenized[i] = tokens;
					replaced += 1;
				}
				None => {
					positions.insert(chunk.id.clone(), ids.len());
					ids.push(chunk.id.clone());
					texts.push(chunk.content.clone());
					metadatas.push(chunk.meta.clone());
					tokenized.push(tokens);
					added += 1;
				}
			}
		}

		let bm25 = Bm25::build(&tokenized).context("building lexical ranking")?;
		let next = IndexState { ids, texts, metadatas, tokenized, positions, bm25 };
		if let Some(path) = &self.path {
			write_snapshot(path, &next.to_snapshot())?;
		}
		let total = next.len();
		*self.state.write() = Arc::new(next);
		debug!(added, replaced, removed, total, "lexical index updated");
		Ok(())
	}

	/// Top `top_k` chunks by BM25 score, best first. Chunks sharing no term
	/// with the query are never returned; an empty index returns nothing.
	pub fn query(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
		let state = self.snapshot();
		if state.len() == 0 || top_k == 0 {
			return Ok(Vec::new());
		}
		let terms = self.analyzer.tokenize(query);
		let ranked = state.bm25.top_n(&terms, top_k)?;
		let mut hits = Vec::with_capacity(ranked.len());
		for (i, score) in ranked {
			let (Some(id), Some(text), Some(meta)) = (state.ids.get(i), state.texts.get(i), state.metadatas.get(i)) else {
				bail!("ranking returned position {i} outside an index of {}", state.len());
			};
			hits.push(SearchHit { chunk: Chunk::new(id.clone(), text.clone(), meta.clone()), score, source: SourceKind::Text });
		}
		Ok(hits)
	}

	fn snapshot(&self) -> Arc<IndexState> {
		Arc::clone(&*self.state.read())
	}
}

impl TextIndexer for LexicalIndex {
	fn add_documents(&self, chunks: &[Chunk]) -> anyhow::Result<()> {
		self.add(chunks)
	}

	fn replace_source(&self, source: &str, chunks: &[Chunk]) -> anyhow::Result<()> {
		LexicalIndex::replace_source(self, source, chunks)
	}

	fn search(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<SearchHit>> {
		self.query(query, top_k)
	}
}

fn load_snapshot(path: &Path) -> Result<IndexState> {
	let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
	let snapshot: Snapshot = serde_json::from_slice(&bytes).context("decoding lexical snapshot")?;
	IndexState::from_snapshot(snapshot)
}

/// Write to a temporary file beside `path`, then rename over it.
fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
	let dir = match path.parent() {
		Some(p) if !p.as_os_str().is_empty() => p,
		_ => Path::new("."),
	};
	std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
	let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
	{
		let mut writer = BufWriter::new(tmp.as_file_mut());
		serde_json::to_writer(&mut writer, snapshot)?;
		writer.flush()?;
	}
	tmp.as_file().sync_all()?;
	tmp.persist(path).with_context(|| format!("replacing {}", path.display()))?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn chunk(id: &str, text: &str, source: &str, page: u32) -> Chunk {
		Chunk::new(id, text, ChunkMeta::new(source, page))
	}

	fn ids(hits: &[SearchHit]) -> Vec<&str> {
		hits.iter().map(|h| h.chunk.id.as_str()).collect()
	}

	#[test]
	fn empty_index_returns_nothing() {
		let index = LexicalIndex::in_memory();
		assert!(index.query("anything", 5).unwrap().is_empty());
		assert!(index.search("anything", 5).unwrap().is_empty());
	}

	#[test]
	fn empty_batch_is_noop() {
		let index = LexicalIndex::in_memory();
		index.add(&[]).unwrap();
		assert!(index.is_empty());
	}

	#[test]
	fn sequences_stay_aligned_and_new_text_is_found() {
		let index = LexicalIndex::in_memory();
		index.add(&[chunk("a_p1_c0", "coolant pump maintenance schedule", "a.pdf", 1)]).unwrap();
		index
			.add(&[
				chunk("b_p2_c0", "spindle bearing replacement procedure", "b.pdf", 2),
				chunk("b_p2_c1", "hydraulic pressure warning lamp", "b.pdf", 2),
			])
			.unwrap();
		assert_eq!(index.sequence_lens(), (3, 3, 3, 3));

		let text = "hydraulic pressure warning lamp";
		let hits = index.query(text, 1).unwrap();
		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].chunk.content, text);
		assert_eq!(hits[0].chunk.id, "b_p2_c1");
		assert_eq!(hits[0].chunk.meta, ChunkMeta::new("b.pdf", 2));
		assert_eq!(hits[0].source, SourceKind::Text);
	}

	#[test]
	fn same_id_replaces_in_place() {
		let index = LexicalIndex::in_memory();
		index.add(&[chunk("doc_p1_c0", "old wording about valves", "doc.pdf", 1)]).unwrap();
		index.add(&[chunk("doc_p1_c0", "new wording about pumps", "doc.pdf", 4)]).unwrap();
		assert_eq!(index.sequence_lens(), (1, 1, 1, 1));
		assert!(index.query("valves", 5).unwrap().is_empty());
		let hits = index.query("pumps", 5).unwrap();
		assert_eq!(hits[0].chunk.meta.page, 4);
	}

	#[test]
	fn replace_source_drops_chunks_missing_from_the_new_revision() {
		let index = LexicalIndex::in_memory();
		index
			.add(&[
				chunk("manual.pdf_p1_c0", "spindle overload alarm", "manual.pdf", 1),
				chunk("manual.pdf_p2_c0", "coolant level check", "manual.pdf", 2),
				chunk("guide.txt_p1_c0", "coolant pump stalled", "guide.txt", 1),
			])
			.unwrap();
		index.replace_source("manual.pdf", &[chunk("manual.pdf_p1_c0", "spindle bearing alarm", "manual.pdf", 1)]).unwrap();

		assert_eq!(index.sequence_lens(), (2, 2, 2, 2));
		assert_eq!(ids(&index.query("coolant", 5).unwrap()), vec!["guide.txt_p1_c0"]);
		assert_eq!(ids(&index.query("bearing", 5).unwrap()), vec!["manual.pdf_p1_c0"]);
		assert!(index.query("overload", 5).unwrap().is_empty());
	}

	#[test]
	fn replace_source_with_nothing_removes_the_source() {
		let index = LexicalIndex::in_memory();
		index.add(&[chunk("a_p1_c0", "alpha text", "a.pdf", 1), chunk("b_p1_c0", "beta text", "b.pdf", 1)]).unwrap();
		index.replace_source("a.pdf", &[]).unwrap();
		assert_eq!(ids(&index.query("text", 5).unwrap()), vec!["b_p1_c0"]);
		index.replace_source("unknown.pdf", &[]).unwrap();
		assert_eq!(index.len(), 1);
	}

	#[test]
	fn duplicate_content_under_distinct_ids_stays_distinct() {
		let index = LexicalIndex::in_memory();
		index
			.add(&[
				chunk("x_p1_c0", "reset the controller", "x.pdf", 1),
				chunk("y_p9_c0", "reset the controller", "y.pdf", 9),
			])
			.unwrap();
		let hits = index.query("reset controller", 5).unwrap();
		assert_eq!(hits.len(), 2);
		let sources: Vec<&str> = hits.iter().map(|h| h.chunk.meta.source.as_str()).collect();
		assert_eq!(sources, vec!["x.pdf", "y.pdf"]);
	}

	#[test]
	fn searches_keep_their_generation() {
		let index = LexicalIndex::in_memory();
		index.add(&[chunk("a", "first entry", "s", 1)]).unwrap();
		let before = index.snapshot();
		index.add(&[chunk("b", "second entry", "s", 1)]).unwrap();
		assert_eq!(before.len(), 1);
		assert_eq!(before.bm25.len(), 1);
		assert_eq!(index.len(), 2);
	}

	#[test]
	fn mismatched_snapshot_is_rejected() {
		let snapshot = Snapshot {
			version: SNAPSHOT_VERSION,
			ids: vec!["a".into()],
			texts: vec![],
			metadatas: vec![],
			tokenized: vec![],
		};
		assert!(IndexState::from_snapshot(snapshot).is_err());
	}
}
