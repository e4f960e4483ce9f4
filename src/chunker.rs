//! Recursive text splitting for indexing
//!
//! Splits text into overlapping chunks by trying coarser separators first
//! (paragraph, line, sentence, word) and only falling back to
//! character-level splitting when nothing else fits. Splitting is applied
//! per source unit (per PDF page, per crawled page) by the retrieval
//! engine, so chunks never straddle source boundaries.

use std::collections::VecDeque;

/// Separators tried in order; the empty string splits into characters
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ".", " ", ""];

/// Default chunk size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap between neighboring chunks in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Recursive separator-based text splitter
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Split `text` into chunks of at most `chunk_size` characters.
    ///
    /// A chunk only exceeds the limit when even character-level splitting
    /// cannot reduce it further, which cannot happen in practice. Chunks
    /// are trimmed; empty chunks are dropped.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Pick the first separator that occurs in the text; "" always matches.
        let mut separator = *separators.last().unwrap_or(&"");
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() || text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator).map(str::to_string).collect()
        };

        let mut chunks = Vec::new();
        let mut good_splits: Vec<String> = Vec::new();

        for split in splits {
            if char_len(&split) < self.chunk_size {
                good_splits.push(split);
            } else {
                if !good_splits.is_empty() {
                    chunks.extend(self.merge_splits(&good_splits, separator));
                    good_splits.clear();
                }
                if remaining.is_empty() {
                    chunks.push(split);
                } else {
                    chunks.extend(self.split_recursive(&split, remaining));
                }
            }
        }
        if !good_splits.is_empty() {
            chunks.extend(self.merge_splits(&good_splits, separator));
        }

        chunks
    }

    /// Greedily merge small splits back into chunks, keeping a sliding
    /// window of trailing splits as overlap for the next chunk.
    fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);

        let mut chunks = Vec::new();
        let mut current: VecDeque<&String> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);
            let join_cost = if current.is_empty() { 0 } else { separator_len };

            if total + len + join_cost > self.chunk_size && !current.is_empty() {
                if let Some(chunk) = join_splits(&current, separator) {
                    chunks.push(chunk);
                }
                // Drop leading splits until the retained tail fits the
                // overlap window and leaves room for the next split.
                while total > self.chunk_overlap
                    || (total + len + if current.is_empty() { 0 } else { separator_len }
                        > self.chunk_size
                        && total > 0)
                {
                    let Some(first) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(first) + if current.is_empty() { 0 } else { separator_len };
                }
            }

            current.push_back(split);
            total += len + if current.len() > 1 { separator_len } else { 0 };
        }

        if let Some(chunk) = join_splits(&current, separator) {
            chunks.push(chunk);
        }

        chunks
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join_splits(splits: &VecDeque<&String>, separator: &str) -> Option<String> {
    let joined = splits
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
