use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream};

const STOP_WORDS: &[&str] = &[
	"a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it", "its", "of", "on",
	"or", "that", "the", "this", "to", "was", "were", "will", "with",
];

/// Tokenizer shared by ingestion and querying.
///
/// Tantivy's simple tokenizer splits on non-alphanumerics and lowercases;
/// every resulting word is then cut into script runs. Latin/digit runs are
/// kept whole, CJK runs (which carry no spaces) expand into character
/// unigrams plus bigrams so that `故障` in a query matches `机器故障代码`.
#[derive(Clone)]
pub struct Analyzer {
	inner: TextAnalyzer,
}

impl Default for Analyzer {
	fn default() -> Self {
		Self::new()
	}
}

impl Analyzer {
	pub fn new() -> Self {
		let inner = TextAnalyzer::builder(SimpleTokenizer::default())
			.filter(LowerCaser)
			.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
			.build();
		Self { inner }
	}

	pub fn tokenize(&self, text: &str) -> Vec<String> {
		let mut analyzer = self.inner.clone();
		let mut stream = analyzer.token_stream(text);
		let mut terms = Vec::new();
		stream.process(&mut |token| push_script_runs(&token.text, &mut terms));
		terms
	}
}

fn push_script_runs(word: &str, out: &mut Vec<String>) {
	let mut run = String::new();
	let mut run_is_cjk = false;
	for ch in word.chars() {
		let cjk = is_cjk(ch);
		if !run.is_empty() && cjk != run_is_cjk {
			flush_run(&run, run_is_cjk, out);
			run.clear();
		}
		run_is_cjk = cjk;
		run.push(ch);
	}
	if !run.is_empty() {
		flush_run(&run, run_is_cjk, out);
	}
}

fn flush_run(run: &str, cjk: bool, out: &mut Vec<String>) {
	if !cjk {
		out.push(run.to_string());
		return;
	}
	let chars: Vec<char> = run.chars().collect();
	out.extend(chars.iter().map(|c| c.to_string()));
	out.extend(chars.windows(2).map(|pair| pair.iter().collect::<String>()));
}

fn is_cjk(ch: char) -> bool {
	matches!(ch,
		'\u{3040}'..='\u{30FF}'   // hiragana, katakana
		| '\u{3400}'..='\u{4DBF}' // CJK extension A
		| '\u{4E00}'..='\u{9FFF}' // CJK unified
		| '\u{AC00}'..='\u{D7AF}' // hangul syllables
		| '\u{F900}'..='\u{FAFF}' // compatibility ideographs
	)
}
