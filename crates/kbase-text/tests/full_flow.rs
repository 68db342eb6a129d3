use std::sync::atomic::{AtomicBool, Ordering};

use kbase_core::traits::TextIndexer;
use kbase_core::types::{Chunk, ChunkMeta};
use kbase_text::LexicalIndex;

fn manual_chunks() -> Vec<Chunk> {
	vec![
		Chunk::new("manual.pdf_p1_c0", "机器故障代码E01表示主轴过载", ChunkMeta::new("manual.pdf", 1)),
		Chunk::new("manual.pdf_p2_c0", "每周检查冷却液液位并清洁过滤网", ChunkMeta::new("manual.pdf", 2)),
		Chunk::new("guide.txt_p1_c0", "Error E02 indicates the coolant pump has stalled", ChunkMeta::new("guide.txt", 1)),
		Chunk::new("guide.txt_p1_c1", "Restart the controller after clearing an alarm", ChunkMeta::new("guide.txt", 1)),
	]
}

#[test]
fn cjk_error_code_query_finds_its_chunk() {
	let index = LexicalIndex::in_memory();
	assert!(index.search("E01故障", 1).unwrap().is_empty());

	let chunk = Chunk::new("manual.pdf_p1_c0", "机器故障代码E01表示主轴过载", ChunkMeta::new("manual.pdf", 1));
	index.add_documents(std::slice::from_ref(&chunk)).unwrap();

	let hits = index.search("E01故障", 1).unwrap();
	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].chunk, chunk);
}

#[test]
fn reload_reproduces_rankings() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("nested").join("lexical.json");
	let queries = ["E01故障", "coolant pump", "冷却液", "restart alarm", "nothing matches this"];

	let index = LexicalIndex::open(&path);
	let chunks = manual_chunks();
	index.add_documents(&chunks[..2]).unwrap();
	index.add_documents(&chunks[2..]).unwrap();
	let before: Vec<_> = queries.iter().map(|q| index.search(q, 10).unwrap()).collect();
	drop(index);

	let reopened = LexicalIndex::open(&path);
	assert_eq!(reopened.len(), 4);
	assert_eq!(reopened.sequence_lens(), (4, 4, 4, 4));
	let after: Vec<_> = queries.iter().map(|q| reopened.search(q, 10).unwrap()).collect();
	assert_eq!(before, after);
	assert!(!after[1].is_empty());
	assert!(after[4].is_empty());
}

#[test]
fn corrupt_snapshot_starts_empty_and_is_overwritten() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("lexical.json");
	std::fs::write(&path, b"{ not json").unwrap();

	let index = LexicalIndex::open(&path);
	assert!(index.is_empty());
	assert!(index.search("anything", 3).unwrap().is_empty());

	index.add_documents(&manual_chunks()).unwrap();
	let reopened = LexicalIndex::open(&path);
	assert_eq!(reopened.len(), 4);
}

#[test]
fn missing_snapshot_starts_empty() {
	let dir = tempfile::tempdir().unwrap();
	let index = LexicalIndex::open(dir.path().join("absent.json"));
	assert!(index.is_empty());
	assert!(!dir.path().join("absent.json").exists());
}

#[test]
fn concurrent_adds_and_searches_stay_consistent() {
	const WRITERS: usize = 4;
	const BATCHES: usize = 5;
	const BATCH: usize = 3;
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("lexical.json");
	let index = LexicalIndex::open(&path);
	let writing = AtomicBool::new(true);

	std::thread::scope(|scope| {
		let index = &index;
		let writing = &writing;
		let writers: Vec<_> = (0..WRITERS)
			.map(|w| {
				scope.spawn(move || {
					for b in 0..BATCHES {
						let chunks: Vec<Chunk> = (0..BATCH)
							.map(|c| {
								let id = format!("w{w}_b{b}_c{c}");
								Chunk::new(id.clone(), format!("pump alarm {id}"), ChunkMeta::new(format!("w{w}.txt"), b as u32 + 1))
							})
							.collect();
						index.add_documents(&chunks).unwrap();
					}
				})
			})
			.collect();
		for _ in 0..2 {
			scope.spawn(move || {
				while writing.load(Ordering::SeqCst) {
					let (ids, texts, metadatas, tokenized) = index.sequence_lens();
					assert!(ids == texts && texts == metadatas && metadatas == tokenized);
					for hit in index.search("pump alarm", 100).unwrap() {
						assert_eq!(hit.chunk.content, format!("pump alarm {}", hit.chunk.id));
					}
				}
			});
		}
		for writer in writers {
			writer.join().unwrap();
		}
		writing.store(false, Ordering::SeqCst);
	});

	let total = WRITERS * BATCHES * BATCH;
	assert_eq!(index.sequence_lens(), (total, total, total, total));
	assert_eq!(index.search("pump alarm", 100).unwrap().len(), total);

	let reopened = LexicalIndex::open(&path);
	assert_eq!(reopened.sequence_lens(), (total, total, total, total));
	assert_eq!(reopened.search("pump alarm", 100).unwrap(), index.search("pump alarm", 100).unwrap());
}
