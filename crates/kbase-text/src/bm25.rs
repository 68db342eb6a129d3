use anyhow::{anyhow, Result};
use tantivy::collector::TopDocs;
use tantivy::query::BooleanQuery;
use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST};
use tantivy::tokenizer::{PreTokenizedString, Token};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

const POSITION_FIELD: &str = "position";
const TERMS_FIELD: &str = "terms";
const WRITER_MEMORY_BYTES: usize = 20_000_000;

#[derive(Debug, Clone, Copy)]
struct Fields {
	position: Field,
	terms: Field,
}

fn build_schema() -> (Schema, Fields) {
	let mut builder = Schema::builder();
	let position = builder.add_u64_field(POSITION_FIELD, FAST);
	let indexing = TextFieldIndexing::default().set_index_option(IndexRecordOption::WithFreqs);
	let terms = builder.add_text_field(TERMS_FIELD, TextOptions::default().set_indexing_options(indexing));
	(builder.build(), Fields { position, terms })
}

/// Okapi BM25 over a fixed corpus of token lists, held in a tantivy RAM index.
///
/// Documents are indexed pre-tokenized, so ranking sees exactly the tokens
/// the analyzer produced at ingestion and nothing is re-analyzed on load.
/// tantivy scores with k1 = 1.2, b = 0.75 and the non-negative idf
/// `ln(1 + (N - n + 0.5) / (n + 0.5))`, so a single-document corpus still
/// scores. The lexical index rebuilds this whenever its documents change.
pub struct Bm25 {
	reader: Option<IndexReader>,
	fields: Fields,
	len: usize,
}

impl Default for Bm25 {
	fn default() -> Self {
		let (_, fields) = build_schema();
		Self { reader: None, fields, len: 0 }
	}
}

impl Bm25 {
	/// Index `corpus`; document `i` reports position `i` in search results.
	pub fn build(corpus: &[Vec<String>]) -> Result<Self> {
		if corpus.is_empty() {
			return Ok(Self::default());
		}
		let (schema, fields) = build_schema();
		let index = Index::create_in_ram(schema);
		let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY_BYTES)?;
		for (i, tokens) in corpus.iter().enumerate() {
			let mut doc = TantivyDocument::new();
			doc.add_u64(fields.position, i as u64);
			doc.add_pre_tokenized_text(fields.terms, pre_tokenized(tokens));
			writer.add_document(doc)?;
		}
		writer.commit()?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		Ok(Self { reader: Some(reader), fields, len: corpus.len() })
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Positions of the `top_k` best documents sharing at least one query
	/// token, best first. Equal scores keep corpus order.
	pub fn top_n(&self, query: &[String], top_k: usize) -> Result<Vec<(usize, f32)>> {
		let Some(reader) = &self.reader else { return Ok(Vec::new()) };
		if top_k == 0 || query.is_empty() {
			return Ok(Vec::new());
		}
		let terms = query.iter().map(|t| Term::from_field_text(self.fields.terms, t)).collect();
		let searcher = reader.searcher();
		let top_docs = searcher.search(&BooleanQuery::new_multiterms_query(terms), &TopDocs::with_limit(top_k))?;

		let mut ranked = Vec::with_capacity(top_docs.len());
		for (score, address) in top_docs {
			if score <= 0.0 {
				continue;
			}
			let positions = searcher.segment_reader(address.segment_ord).fast_fields().u64(POSITION_FIELD)?;
			let position = positions
				.first(address.doc_id)
				.ok_or_else(|| anyhow!("indexed document {address:?} has no position"))?;
			ranked.push((position as usize, score));
		}
		ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
		Ok(ranked)
	}
}

fn pre_tokenized(tokens: &[String]) -> PreTokenizedString {
	let mut text = String::new();
	let mut out = Vec::with_capacity(tokens.len());
	for (position, token) in tokens.iter().enumerate() {
		if !text.is_empty() {
			text.push(' ');
		}
		let offset_from = text.len();
		text.push_str(token);
		out.push(Token { offset_from, offset_to: text.len(), position, text: token.clone(), position_length: 1 });
	}
	PreTokenizedString { text, tokens: out }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn toks(s: &str) -> Vec<String> {
		s.split_whitespace().map(str::to_string).collect()
	}

	fn score_of(bm25: &Bm25, query: &str, position: usize) -> f32 {
		bm25.top_n(&toks(query), 10).unwrap().into_iter().find(|(i, _)| *i == position).map(|(_, s)| s).unwrap()
	}

	#[test]
	fn single_document_corpus_scores_positive() {
		let bm25 = Bm25::build(&[toks("spindle overload e01")]).unwrap();
		let ranked = bm25.top_n(&toks("e01"), 5).unwrap();
		assert_eq!(ranked.len(), 1);
		assert!(ranked[0].1 > 0.0);
	}

	#[test]
	fn rarer_terms_weigh_more() {
		let corpus = vec![toks("pump valve"), toks("pump motor"), toks("pump valve motor")];
		let bm25 = Bm25::build(&corpus).unwrap();
		assert!(score_of(&bm25, "valve", 0) > score_of(&bm25, "pump", 0));
	}

	#[test]
	fn unmatched_documents_are_excluded() {
		let corpus = vec![toks("alpha beta"), toks("gamma delta"), toks("beta beta")];
		let bm25 = Bm25::build(&corpus).unwrap();
		let positions: Vec<usize> = bm25.top_n(&toks("beta"), 10).unwrap().iter().map(|(i, _)| *i).collect();
		assert_eq!(positions, vec![2, 0]);
	}

	#[test]
	fn top_n_truncates_and_handles_zero() {
		let corpus = vec![toks("a x"), toks("a y"), toks("a z")];
		let bm25 = Bm25::build(&corpus).unwrap();
		assert_eq!(bm25.top_n(&toks("a"), 2).unwrap().len(), 2);
		assert!(bm25.top_n(&toks("a"), 0).unwrap().is_empty());
		assert!(bm25.top_n(&[], 3).unwrap().is_empty());
	}

	#[test]
	fn ties_keep_corpus_order() {
		let corpus = vec![toks("same text"), toks("same text"), toks("other")];
		let bm25 = Bm25::build(&corpus).unwrap();
		let ranked = bm25.top_n(&toks("same"), 5).unwrap();
		assert_eq!(ranked.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1]);
	}

	#[test]
	fn empty_corpus_scores_nothing() {
		let bm25 = Bm25::build(&[]).unwrap();
		assert!(bm25.is_empty());
		assert!(bm25.top_n(&toks("anything"), 3).unwrap().is_empty());
	}

	#[test]
	fn rebuild_reproduces_scores() {
		let corpus = vec![toks("coolant pump"), toks("pump pressure alarm"), toks("alarm reset")];
		let first = Bm25::build(&corpus).unwrap().top_n(&toks("pump alarm"), 5).unwrap();
		let second = Bm25::build(&corpus).unwrap().top_n(&toks("pump alarm"), 5).unwrap();
		assert_eq!(first, second);
	}
}
