//! kbase-text
//!
//! Lexical retrieval: a tantivy tokenizer pipeline extended with CJK
//! n-grams, BM25 ranking over a tantivy RAM index, and [`LexicalIndex`],
//! which keeps chunk texts, metadata and token lists in parallel and
//! persists them as a JSON snapshot after every mutation.

pub mod analyzer;
pub mod bm25;
pub mod index;

pub use analyzer::Analyzer;
pub use bm25::Bm25;
pub use index::LexicalIndex;
