use kbase_core::traits::VectorIndexer;
use kbase_core::types::{Chunk, ChunkMeta};
use kbase_vector::LanceVectorIndex;
use tempfile::TempDir;

fn unit(dim: usize, hot: usize) -> Vec<f32> {
	let mut v = vec![0.0; dim];
	v[hot] = 1.0;
	v
}

#[tokio::test]
async fn lancedb_upsert_and_query() {
	let tmp = TempDir::new().expect("tmp");
	let dim = 8;
	let index = LanceVectorIndex::open(tmp.path(), "chunks_test", dim).await.expect("open");

	// Missing table answers with nothing.
	assert!(index.query(&unit(dim, 0), 5).await.expect("query").is_empty());

	let chunks = vec![
		Chunk::new("manual.pdf_p1_c0", "spindle overload", ChunkMeta::new("manual.pdf", 1)),
		Chunk::new("manual.pdf_p2_c0", "coolant level", ChunkMeta::new("manual.pdf", 2)),
		Chunk::new("guide.txt_p1_c0", "alarm reset", ChunkMeta::new("guide.txt", 1)),
	];
	let embeddings = vec![unit(dim, 0), unit(dim, 1), unit(dim, 2)];
	index.upsert(&chunks, &embeddings).await.expect("upsert");
	assert_eq!(index.count().await.expect("count"), 3);

	let hits = index.query(&unit(dim, 1), 2).await.expect("query");
	assert_eq!(hits.len(), 2);
	assert_eq!(hits[0].chunk, chunks[1]);
	assert!(hits[0].score >= hits[1].score);

	// Same id again replaces the row instead of adding one.
	let replacement = Chunk::new("manual.pdf_p2_c0", "coolant level revised", ChunkMeta::new("manual.pdf", 2));
	index.upsert(std::slice::from_ref(&replacement), &[unit(dim, 1)]).await.expect("re-upsert");
	assert_eq!(index.count().await.expect("count"), 3);
	let hits = index.query(&unit(dim, 1), 1).await.expect("query");
	assert_eq!(hits[0].chunk.content, "coolant level revised");
}

#[tokio::test]
async fn lancedb_rejects_wrong_dimension() {
	let tmp = TempDir::new().expect("tmp");
	let index = LanceVectorIndex::open(tmp.path(), "chunks_dim", 4).await.expect("open");
	let chunk = Chunk::new("a", "text", ChunkMeta::new("a.txt", 1));
	assert!(index.upsert(&[chunk], &[vec![1.0; 3]]).await.is_err());
}

#[tokio::test]
async fn lancedb_replace_source_drops_superseded_rows() {
	let tmp = TempDir::new().expect("tmp");
	let dim = 8;
	let index = LanceVectorIndex::open(tmp.path(), "chunks_replace", dim).await.expect("open");
	let chunks = vec![
		Chunk::new("manual.pdf_p1_c0", "spindle overload", ChunkMeta::new("manual.pdf", 1)),
		Chunk::new("manual.pdf_p2_c0", "coolant level", ChunkMeta::new("manual.pdf", 2)),
		Chunk::new("guide.txt_p1_c0", "alarm reset", ChunkMeta::new("guide.txt", 1)),
	];
	index.upsert(&chunks, &[unit(dim, 0), unit(dim, 1), unit(dim, 2)]).await.expect("upsert");

	let revised = Chunk::new("manual.pdf_p1_c0", "spindle overload revised", ChunkMeta::new("manual.pdf", 1));
	index.replace_source("manual.pdf", std::slice::from_ref(&revised), &[unit(dim, 0)]).await.expect("replace");
	assert_eq!(index.count().await.expect("count"), 2);

	let hits = index.query(&unit(dim, 1), 5).await.expect("query");
	let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
	assert!(!ids.contains(&"manual.pdf_p2_c0"));
	assert!(ids.contains(&"guide.txt_p1_c0"));
	assert!(hits.iter().any(|h| h.chunk == revised));
}
