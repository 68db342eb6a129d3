use anyhow::{anyhow, bail, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use kbase_core::traits::VectorIndexer;
use kbase_core::types::{Chunk, ChunkMeta, SearchHit, SourceKind};

use crate::schema::build_arrow_schema;

/// Chunk table in a local LanceDB database, searched by cosine distance.
pub struct LanceVectorIndex {
	db: Connection,
	table_name: String,
	dim: usize,
}

impl LanceVectorIndex {
	pub async fn open(db_path: &Path, table_name: &str, dim: usize) -> Result<Self> {
		let db = connect(db_path.to_string_lossy().as_ref()).execute().await?;
		info!(path = %db_path.display(), table = table_name, "opened LanceDB");
		Ok(Self { db, table_name: table_name.to_string(), dim })
	}

	pub fn dim(&self) -> usize {
		self.dim
	}

	async fn table_exists(&self) -> Result<bool> {
		Ok(self.db.table_names().execute().await?.contains(&self.table_name))
	}

	pub async fn count(&self) -> Result<usize> {
		if !self.table_exists().await? {
			return Ok(0);
		}
		Ok(self.db.open_table(&self.table_name).execute().await?.count_rows(None).await?)
	}

	fn to_record_batch(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<RecordBatch> {
		let schema = build_arrow_schema(self.dim);
		let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
		let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
		let sources: Vec<&str> = chunks.iter().map(|c| c.meta.source.as_str()).collect();
		let pages: Vec<i32> = chunks.iter().map(|c| c.meta.page as i32).collect();
		let vectors = embeddings.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
		let record_batch = RecordBatch::try_new(schema, vec![
			Arc::new(StringArray::from(ids)),
			Arc::new(StringArray::from(contents)),
			Arc::new(StringArray::from(sources)),
			Arc::new(Int32Array::from(pages)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, self.dim as i32)),
		])?;
		Ok(record_batch)
	}
}

#[async_trait]
impl VectorIndexer for LanceVectorIndex {
	async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
		if chunks.is_empty() {
			return Ok(());
		}
		if chunks.len() != embeddings.len() {
			bail!("{} chunks but {} embeddings", chunks.len(), embeddings.len());
		}
		if let Some(bad) = embeddings.iter().find(|v| v.len() != self.dim) {
			bail!("embedding has {} dims, table expects {}", bad.len(), self.dim);
		}
		let record_batch = self.to_record_batch(chunks, embeddings)?;
		let schema = record_batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
		if self.table_exists().await? {
			let table = self.db.open_table(&self.table_name).execute().await?;
			let mut merge = table.merge_insert(&["id"]);
			merge.when_matched_update_all(None).when_not_matched_insert_all();
			let _ = merge.execute(reader).await?;
		} else {
			self.db.create_table(&self.table_name, reader).execute().await?;
		}
		debug!(rows = chunks.len(), table = %self.table_name, "upserted chunks");
		Ok(())
	}

	async fn replace_source(&self, source: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
		self.upsert(chunks, embeddings).await?;
		if !self.table_exists().await? {
			return Ok(());
		}
		let predicate = stale_rows_predicate(source, chunks);
		let table = self.db.open_table(&self.table_name).execute().await?;
		let _ = table.delete(&predicate).await?;
		debug!(source, kept = chunks.len(), table = %self.table_name, "replaced source rows");
		Ok(())
	}

	async fn query(&self, vector: &[f32], n: usize) -> Result<Vec<SearchHit>> {
		if n == 0 || !self.table_exists().await? {
			return Ok(Vec::new());
		}
		let table = self.db.open_table(&self.table_name).execute().await?;
		let mut stream = table
			.vector_search(vector.to_vec())?
			.distance_type(DistanceType::Cosine)
			.limit(n)
			.execute()
			.await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			let ids = string_column(&batch, "id")?;
			let contents = string_column(&batch, "content")?;
			let sources = string_column(&batch, "source")?;
			let pages = batch
				.column_by_name("page")
				.and_then(|c| c.as_any().downcast_ref::<Int32Array>())
				.ok_or_else(|| anyhow!("page column missing"))?;
			let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
			for i in 0..batch.num_rows() {
				let score = distances.map(|d| 1.0 - d.value(i)).unwrap_or(0.0);
				let meta = ChunkMeta::new(sources.value(i), pages.value(i).max(0) as u32);
				hits.push(SearchHit {
					chunk: Chunk::new(ids.value(i), contents.value(i), meta),
					score,
					source: SourceKind::Vector,
				});
			}
		}
		hits.sort_by(|a, b| b.score.total_cmp(&a.score));
		hits.truncate(n);
		Ok(hits)
	}
}

fn sql_literal(value: &str) -> String {
	format!("'{}'", value.replace('\'', "''"))
}

/// Rows of `source` whose id is not among `chunks`.
fn stale_rows_predicate(source: &str, chunks: &[Chunk]) -> String {
	let source_match = format!("source = {}", sql_literal(source));
	if chunks.is_empty() {
		return source_match;
	}
	let ids: Vec<String> = chunks.iter().map(|c| sql_literal(&c.id)).collect();
	format!("{source_match} AND id NOT IN ({})", ids.join(", "))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| anyhow!("{name} column missing"))
}
