//! kbase-vector
//!
//! Dense retrieval adapters behind `kbase_core::traits::VectorIndexer`:
//! a LanceDB chunk table and a brute-force in-memory index.

pub mod lance;
pub mod memory;
pub mod schema;

pub use lance::LanceVectorIndex;
pub use memory::MemoryVectorIndex;
pub use schema::build_arrow_schema;
