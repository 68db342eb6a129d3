use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Columns of a chunk table; `dim` is the embedding width.
pub fn build_arrow_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("source", DataType::Utf8, false),
		Field::new("page", DataType::Int32, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true),
	]))
}
