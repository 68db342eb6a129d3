//! Recursive character splitter used at ingestion time.
//!
//! Text is cut on the first separator (in priority order) that occurs in it;
//! pieces still longer than `chunk_size` are split again with the remaining
//! separators, and adjacent small pieces are merged back into windows of at
//! most `chunk_size` characters that share up to `chunk_overlap` characters.

use std::collections::VecDeque;

use crate::config::IngestSettings;
use crate::types::{Chunk, ChunkMeta};

pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", "。", "！", "？", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(500, 50)
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_settings(settings: &IngestSettings) -> Self {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    /// Split every page of `source` and assign ids `{source}_p{page}_c{i}`,
    /// `i` counting chunks within the page.
    pub fn split_pages(&self, source: &str, pages: &[(u32, String)]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for (page, text) in pages {
            for (i, piece) in self.split_text(text).into_iter().enumerate() {
                chunks.push(Chunk::new(format!("{source}_p{page}_c{i}"), piece, ChunkMeta::new(source, *page)));
            }
        }
        chunks
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.split_with(text, &separators)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let Some(pos) = separators.iter().position(|s| s.is_empty() || text.contains(s)) else {
            let trimmed = text.trim();
            return if trimmed.is_empty() { Vec::new() } else { vec![trimmed.to_string()] };
        };
        let separator = separators[pos];
        let rest = &separators[pos + 1..];

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect()
        } else {
            text.split_inclusive(separator).collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) <= self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if rest.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(piece, rest));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;
        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&window, &mut out);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        if !window.is_empty() {
            push_joined(&window, &mut out);
        }
        out
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_joined(window: &VecDeque<&str>, out: &mut Vec<String>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}
