//! Recursive, overlapping character chunker.
//!
//! Splits extracted document text into [`Chunk`]s of at most `chunk_size`
//! characters, carrying up to `chunk_overlap` characters of the previous
//! chunk into the next one so that context is not severed at a boundary.
//!
//! # Algorithm
//!
//! 1. Pick the coarsest separator present in the text, trying `"\n\n"`
//!    (paragraph), `"\n"` (line), `" "` (word), then `""` (character).
//! 2. Split on it, keeping each separator attached to the start of the
//!    piece that follows it.
//! 3. Pieces shorter than `chunk_size` are merged greedily into chunks.
//!    When a chunk is emitted, pieces are dropped from the front of the
//!    buffer until at most `chunk_overlap` characters remain; those carry
//!    over into the next chunk.
//! 4. Pieces that are still too long are split again with the remaining,
//!    finer separators.
//! 5. Emitted chunks are whitespace-trimmed; blank chunks are dropped.
//!
//! Lengths are measured in characters, never bytes, and every chunk is a
//! contiguous substring of the input.
//!
//! # Example
//!
//! ```rust
//! use rag_harness::chunk::TextSplitter;
//!
//! let splitter = TextSplitter::new(1000, 200).unwrap();
//! let chunks = splitter.split_document("Hello world.\n\nSecond paragraph.", 7, "notes.html");
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].source_document_id, 7);
//! ```

use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Paragraph, line, word, character.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Byte range into the text being split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

/// A chunk of text before it is tagged with document identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSegment<'a> {
    pub text: &'a str,
    /// Character offset of `text` within the split input.
    pub start_index: usize,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for TextSplitter {
    /// 1000-character chunks with 200 characters of overlap.
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be > 0".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Replace the separator ladder, coarsest first.
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` and tag every piece with the owning document.
    ///
    /// Chunk indices are contiguous from 0 and follow source order.
    pub fn split_document(&self, text: &str, document_id: i64, filename: &str) -> Vec<Chunk> {
        self.split_text(text)
            .into_iter()
            .enumerate()
            .map(|(i, seg)| Chunk {
                text: seg.text.to_string(),
                source_document_id: document_id,
                source_filename: filename.to_string(),
                chunk_index: i as i64,
                start_index: seg.start_index as i64,
            })
            .collect()
    }

    /// Split `text` into trimmed, overlapping segments in source order.
    pub fn split_text<'a>(&self, text: &'a str) -> Vec<TextSegment<'a>> {
        let mut spans = Vec::new();
        self.split_span(
            text,
            Span {
                start: 0,
                end: text.len(),
            },
            &self.separators,
            &mut spans,
        );

        // Spans come out with non-decreasing starts, so char offsets can be
        // counted incrementally.
        let mut byte_cursor = 0usize;
        let mut char_cursor = 0usize;
        spans
            .into_iter()
            .map(|span| {
                if span.start < byte_cursor {
                    byte_cursor = 0;
                    char_cursor = 0;
                }
                char_cursor += text[byte_cursor..span.start].chars().count();
                byte_cursor = span.start;
                TextSegment {
                    text: &text[span.start..span.end],
                    start_index: char_cursor,
                }
            })
            .collect()
    }

    fn split_span(&self, text: &str, span: Span, separators: &[String], out: &mut Vec<Span>) {
        let slice = &text[span.start..span.end];
        let (separator, finer) = pick_separator(slice, separators);

        let mut good: Vec<Span> = Vec::new();
        for piece in split_keep_start(slice, separator, span.start) {
            if char_len(text, piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                self.merge(text, &good, out);
                good.clear();
            }
            if finer.is_empty() {
                push_trimmed(text, piece, out);
            } else {
                self.split_span(text, piece, finer, out);
            }
        }
        if !good.is_empty() {
            self.merge(text, &good, out);
        }
    }

    /// Greedily merge adjacent small pieces into chunks with overlap.
    fn merge(&self, text: &str, pieces: &[Span], out: &mut Vec<Span>) {
        let mut current: VecDeque<(Span, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(text, piece);
            if total + len > self.chunk_size && !current.is_empty() {
                push_joined(text, &current, out);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            current.push_back((piece, len));
            total += len;
        }

        if !current.is_empty() {
            push_joined(text, &current, out);
        }
    }
}

/// First separator that occurs in `slice`, plus the finer ones after it.
fn pick_separator<'s>(slice: &str, separators: &'s [String]) -> (&'s str, &'s [String]) {
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            return ("", &[]);
        }
        if slice.contains(sep.as_str()) {
            return (sep.as_str(), &separators[i + 1..]);
        }
    }
    ("", &[])
}

/// Split on `separator`, attaching each separator to the following piece.
/// An empty separator splits into single characters.
fn split_keep_start(slice: &str, separator: &str, base: usize) -> Vec<Span> {
    if separator.is_empty() {
        return slice
            .char_indices()
            .map(|(i, c)| Span {
                start: base + i,
                end: base + i + c.len_utf8(),
            })
            .collect();
    }

    let mut spans = Vec::new();
    let mut last = 0usize;
    for (idx, _) in slice.match_indices(separator) {
        if idx > last {
            spans.push(Span {
                start: base + last,
                end: base + idx,
            });
        }
        last = idx;
    }
    if slice.len() > last {
        spans.push(Span {
            start: base + last,
            end: base + slice.len(),
        });
    }
    spans
}

fn char_len(text: &str, span: Span) -> usize {
    text[span.start..span.end].chars().count()
}

fn push_joined(text: &str, pieces: &VecDeque<(Span, usize)>, out: &mut Vec<Span>) {
    if let (Some((first, _)), Some((last, _))) = (pieces.front(), pieces.back()) {
        push_trimmed(
            text,
            Span {
                start: first.start,
                end: last.end,
            },
            out,
        );
    }
}

fn push_trimmed(text: &str, span: Span, out: &mut Vec<Span>) {
    let slice = &text[span.start..span.end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = slice.len() - slice.trim_start().len();
    out.push(Span {
        start: span.start + lead,
        end: span.start + lead + trimmed.len(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter() -> TextSplitter {
        TextSplitter::new(1000, 200).unwrap()
    }

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Stitch chunks back together using their offsets, skipping overlap.
    fn reassemble(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        let mut cursor = 0usize;
        for c in chunks {
            let start = c.start_index as usize;
            let len = c.text.chars().count();
            if start + len <= cursor {
                continue;
            }
            let skip = cursor.saturating_sub(start);
            out.extend(c.text.chars().skip(skip));
            cursor = start + len;
        }
        out
    }

    fn strip_ws(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = splitter().split_document("Hello, world!", 1, "a.html");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].start_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].source_filename, "a.html");
    }

    #[test]
    fn test_empty_and_blank_text() {
        assert!(splitter().split_document("", 1, "a.pdf").is_empty());
        assert!(splitter().split_document(" \n\n \n", 1, "a.pdf").is_empty());
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert!(TextSplitter::new(100, 100).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
        assert!(TextSplitter::new(100, 99).is_ok());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let para_a = "a".repeat(600);
        let para_b = "b".repeat(600);
        let text = format!("{}\n\n{}", para_a, para_b);
        let chunks = splitter().split_document(&text, 1, "x.docx");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, para_a);
        assert_eq!(chunks[1].text, para_b);
        assert_eq!(chunks[1].start_index, 602);
    }

    #[test]
    fn test_chunks_never_exceed_size() {
        let text = format!("{}\n\n{}\n{}", words(900), "z".repeat(2500), words(40));
        let chunks = splitter().split_document(&text, 1, "x.pdf");
        assert!(chunks.len() > 3);
        for c in &chunks {
            assert!(c.text.chars().count() <= 1000, "chunk too long");
            assert!(!c.text.is_empty());
        }
    }

    #[test]
    fn test_unbroken_run_falls_back_to_characters() {
        let text = "x".repeat(2500);
        let chunks = splitter().split_document(&text, 1, "x.pdf");
        assert_eq!(chunks[0].text.chars().count(), 1000);
        assert_eq!(chunks[1].start_index, 800);
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_adjacent_chunks_overlap() {
        let text = words(1200);
        let chunks = splitter().split_document(&text, 1, "x.html");
        assert!(chunks.len() > 2);
        let chars: Vec<char> = text.chars().collect();
        for pair in chunks.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let a_end = a.start_index as usize + a.text.chars().count();
            let b_start = b.start_index as usize;
            assert!(b_start < a_end, "expected overlap between chunks");
            let overlap = a_end - b_start;
            assert!(overlap <= 200, "overlap {} too large", overlap);
            assert!(overlap >= 150, "overlap {} too small", overlap);

            let shared: String = chars[b_start..a_end].iter().collect();
            assert!(a.text.ends_with(&shared));
            assert!(b.text.starts_with(&shared));
        }
    }

    #[test]
    fn test_chunks_are_substrings_at_their_offsets() {
        let text = format!(
            "Intro line.\n{}\n\n{}\n\nTail paragraph here.",
            words(300),
            words(500)
        );
        let chars: Vec<char> = text.chars().collect();
        for c in splitter().split_document(&text, 3, "x.pdf") {
            let start = c.start_index as usize;
            let len = c.text.chars().count();
            let at_offset: String = chars[start..start + len].iter().collect();
            assert_eq!(at_offset, c.text);
        }
    }

    #[test]
    fn test_reassembly_recovers_text_modulo_whitespace() {
        let text = format!(
            "Title\n\n{}\n\n  {}\n{}\n\n\n\n{}",
            words(250),
            "y".repeat(1700),
            words(420),
            words(3)
        );
        let chunks = splitter().split_document(&text, 1, "x.docx");
        assert_eq!(strip_ws(&reassemble(&chunks)), strip_ws(&text));
    }

    #[test]
    fn test_indices_contiguous_and_offsets_ordered() {
        let text = (0..200)
            .map(|i| format!("Sentence number {} is here.", i))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = splitter().split_document(&text, 9, "x.html");
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.source_document_id, 9);
        }
        for pair in chunks.windows(2) {
            assert!(pair[0].start_index < pair[1].start_index);
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────┐ │ héllo wörld │ └──────┘ ".repeat(80);
        let chunks = TextSplitter::new(50, 10).unwrap().split_document(&text, 1, "x.html");
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.text.chars().count() <= 50);
        }
        assert_eq!(strip_ws(&reassemble(&chunks)), strip_ws(&text));
    }

    #[test]
    fn test_deterministic() {
        let text = words(700);
        let c1 = splitter().split_document(&text, 1, "x.pdf");
        let c2 = splitter().split_document(&text, 1, "x.pdf");
        assert_eq!(c1, c2);
    }
}
