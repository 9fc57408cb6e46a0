//! Recursive character text splitter.
//!
//! Splits document text into overlapping [`Chunk`]s of at most `chunk_size`
//! characters. Splitting tries an ordered list of separators (by default
//! paragraph break, line break, space, and the empty string) and uses the
//! first one present in the text; pieces still too large are split again
//! with the remaining separators, and as a last resort cut at character
//! boundaries.
//!
//! # Algorithm
//!
//! 1. Pick the first separator that occurs in the segment (the empty
//!    separator always matches).
//! 2. Split at every occurrence, keeping the separator at the start of the
//!    following piece, so the pieces tile the segment exactly.
//! 3. Pieces shorter than `chunk_size` are merged greedily into chunks.
//!    When a chunk is emitted, its trailing pieces (up to `chunk_overlap`
//!    characters) are carried into the next chunk.
//! 4. Oversized pieces recurse with the remaining separators; with none
//!    left they are cut character by character.
//!
//! Chunks are never trimmed, so every chunk is an exact substring of its
//! document and `start` records its character offset. Removing each chunk's
//! overlap with its predecessor and concatenating reconstructs the text.

use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Document};

/// A contiguous byte range of the text being split, with its length in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    /// Create a splitter. `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize, separators: Vec<String>) -> Self {
        let chunk_size = chunk_size.max(1);
        let separators = if separators.is_empty() {
            vec![String::new()]
        } else {
            separators
        };
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(
            config.chunk_size,
            config.chunk_overlap,
            config.separators.clone(),
        )
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split every document, preserving document order then position.
    ///
    /// Returns an empty vector when all inputs are empty.
    pub fn chunk(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            for (start, text) in self.split_text(&doc.text) {
                chunks.push(Chunk {
                    text: text.to_string(),
                    metadata: doc.metadata.clone(),
                    start,
                });
            }
        }
        tracing::info!(
            documents = documents.len(),
            chunks = chunks.len(),
            "split documents into chunks"
        );
        chunks
    }

    /// Split a single text into `(char_offset, substring)` pairs.
    pub fn split_text<'a>(&self, text: &'a str) -> Vec<(usize, &'a str)> {
        if text.is_empty() {
            return Vec::new();
        }
        let whole = Piece {
            start: 0,
            end: text.len(),
            chars: text.chars().count(),
        };
        let mut spans = Vec::new();
        self.split_piece(text, whole, &self.separators, &mut spans);

        // Spans are emitted in increasing start order; convert byte offsets
        // to char offsets with a running count.
        let mut out = Vec::with_capacity(spans.len());
        let mut byte_pos = 0;
        let mut char_pos = 0;
        for span in spans {
            char_pos += text[byte_pos..span.start].chars().count();
            byte_pos = span.start;
            out.push((char_pos, &text[span.start..span.end]));
        }
        out
    }

    fn split_piece(&self, text: &str, piece: Piece, separators: &[String], out: &mut Vec<Piece>) {
        let segment = &text[piece.start..piece.end];

        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if segment.contains(sep.as_str()) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut good: Vec<Piece> = Vec::new();
        for split in split_keep_start(text, piece, separator) {
            if split.chars < self.chunk_size {
                good.push(split);
                continue;
            }
            if !good.is_empty() {
                self.merge(&good, out);
                good.clear();
            }
            if remaining.is_empty() {
                self.merge(&split_keep_start(text, split, ""), out);
            } else {
                self.split_piece(text, split, remaining, out);
            }
        }
        if !good.is_empty() {
            self.merge(&good, out);
        }
    }

    /// Greedily combine contiguous pieces into chunks of at most `chunk_size`
    /// chars, carrying up to `chunk_overlap` chars of tail into the next chunk.
    fn merge(&self, pieces: &[Piece], out: &mut Vec<Piece>) {
        let mut current: VecDeque<Piece> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            if total + piece.chars > self.chunk_size && !current.is_empty() {
                out.push(join(&current, total));
                while total > self.chunk_overlap
                    || (total > 0 && total + piece.chars > self.chunk_size)
                {
                    match current.pop_front() {
                        Some(first) => total -= first.chars,
                        None => break,
                    }
                }
            }
            current.push_back(piece);
            total += piece.chars;
        }

        if !current.is_empty() {
            out.push(join(&current, total));
        }
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

fn join(pieces: &VecDeque<Piece>, chars: usize) -> Piece {
    let start = pieces.front().map(|p| p.start).unwrap_or(0);
    let end = pieces.back().map(|p| p.end).unwrap_or(start);
    Piece { start, end, chars }
}

/// Split `piece` at each occurrence of `sep`, attaching the separator to the
/// start of the following piece. The empty separator splits into characters.
/// Empty pieces are dropped, so the result tiles `piece` exactly.
fn split_keep_start(text: &str, piece: Piece, sep: &str) -> Vec<Piece> {
    let segment = &text[piece.start..piece.end];

    if sep.is_empty() {
        return segment
            .char_indices()
            .map(|(i, c)| Piece {
                start: piece.start + i,
                end: piece.start + i + c.len_utf8(),
                chars: 1,
            })
            .collect();
    }

    let mut bounds: Vec<usize> = vec![0];
    bounds.extend(segment.match_indices(sep).map(|(i, _)| i));
    bounds.push(segment.len());
    bounds.dedup();

    bounds
        .windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| Piece {
            start: piece.start + w[0],
            end: piece.start + w[1],
            chars: segment[w[0]..w[1]].chars().count(),
        })
        .collect()
}
