//! Recursive character splitter for the requirements document.
//!
//! Text is split on the coarsest separator that occurs in it (`"\n\n"`,
//! then `"\n"`, then `" "`, then between characters). Pieces are merged back
//! greedily up to `chunk_size` characters, and each new chunk starts with up
//! to `chunk_overlap` characters worth of trailing pieces from the previous
//! one. Pieces that are still too long are split again with the next finer
//! separator.
//!
//! All lengths are in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use commitlens::chunk::split_text;
//!
//! let pieces = split_text("First paragraph.\n\nSecond paragraph.", 1000, 100);
//! assert_eq!(pieces, vec!["First paragraph.\n\nSecond paragraph."]);
//! ```

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::models::Chunk;

const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Split `text` into trimmed, non-empty pieces of at most `chunk_size`
/// characters (a single unsplittable piece can only exceed it when
/// `chunk_size` is smaller than one character, which validation forbids).
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let splitter = Splitter {
        chunk_size: chunk_size.max(1),
        chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
    };
    splitter.split(text, SEPARATORS)
}

/// Split the requirements document into [`Chunk`]s with contiguous indices.
///
/// Every chunk carries `source_path` and `chunk_index` metadata; the index
/// module adds title and requirement id on top.
pub fn chunk_document(
    source_path: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    split_text(text, chunk_size, chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(source_path, i as i64, piece))
        .collect()
}

struct Splitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Splitter {
    fn split(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator present in the text; "" always matches.
        let (idx, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map(|(i, sep)| (i, *sep))
            .unwrap_or((separators.len().saturating_sub(1), ""));
        let finer = separators.get(idx + 1..).unwrap_or(&[]);

        let splits: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut output = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in splits {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                output.extend(self.merge(&pending, separator));
                pending.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    output.push(trimmed.to_string());
                }
            } else {
                output.extend(self.split(piece, finer));
            }
        }

        if !pending.is_empty() {
            output.extend(self.merge(&pending, separator));
        }

        output
    }

    /// Greedily join small pieces, carrying an overlap tail between chunks.
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { sep_len };

            if total + len + joiner > self.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current, separator);

                while total > self.chunk_overlap
                    || (total + len + if current.is_empty() { 0 } else { sep_len }
                        > self.chunk_size
                        && total > 0)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(front);
                    if !current.is_empty() {
                        total -= sep_len;
                    }
                }
            }

            if !current.is_empty() {
                total += sep_len;
            }
            current.push_back(piece);
            total += len;
        }

        push_joined(&mut docs, &current, separator);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, current: &VecDeque<&str>, separator: &str) {
    let joined = current.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Create a single [`Chunk`] with a UUID and SHA-256 content hash.
fn make_chunk(source_path: &str, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let mut metadata = Map::new();
    metadata.insert("source_path".to_string(), Value::from(source_path));
    metadata.insert("chunk_index".to_string(), Value::from(index));

    Chunk {
        id: Uuid::new_v4().to_string(),
        chunk_index: index,
        text,
        hash,
        metadata,
    }
}
