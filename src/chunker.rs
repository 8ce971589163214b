//! Overlapping, boundary-aware text splitter.
//!
//! Windows are measured in `char`s, so a cut can never land inside a
//! multi-byte codepoint. Each window ends at the best natural boundary found
//! in its second half (blank line, line break, sentence end, whitespace) and
//! falls back to a hard cut at `chunk_size`. The next window starts exactly
//! `chunk_overlap` characters before the previous one ended.
//!
//! Windows that are only whitespace are not emitted. Across a whitespace run
//! longer than a window, the chunks on either side therefore share an
//! overlap string of blanks without covering the same span of the source.
use tracing::debug;

use crate::config::ChunkingConfig;
use crate::document::{Chunk, Document, MetadataValue, chunk_id};
use crate::error::Result;

const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?'];
const CJK_TERMINATORS: &[char] = &['。', '！', '？'];

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Fails with `InvalidConfig` when `chunk_overlap >= chunk_size`.
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Split a document into chunks carrying its metadata plus
    /// `source_id` and `chunk_index`.
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = self
            .split_text(&document.content)
            .into_iter()
            .enumerate()
            .map(|(position, text)| {
                let mut metadata = document.metadata.clone();
                metadata.insert(
                    "source_id".to_string(),
                    MetadataValue::String(document.source_id.clone()),
                );
                metadata.insert("chunk_index".to_string(), MetadataValue::from(position));
                Chunk {
                    chunk_id: chunk_id(&document.source_id, position),
                    source_id: document.source_id.clone(),
                    position,
                    text,
                    metadata,
                }
            })
            .collect();

        debug!(
            source_id = %document.source_id,
            chunks = chunks.len(),
            "split document"
        );
        chunks
    }

    /// Split raw text into overlapping windows. Whitespace-only windows are dropped.
    pub fn split_text(&self, content: &str) -> Vec<String> {
        if content.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = content.chars().collect();
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut windows = Vec::new();
        let mut start = 0;
        loop {
            let hard_end = (start + size).min(chars.len());
            let end = if hard_end == chars.len() {
                hard_end
            } else {
                find_boundary(&chars, start, hard_end, size, overlap)
            };

            let window = &chars[start..end];
            if window.iter().any(|c| !c.is_whitespace()) {
                windows.push(window.iter().collect());
            }

            if end == chars.len() {
                break;
            }
            // end > start + overlap, so this always advances
            start = end - overlap;
        }

        windows
    }
}

/// Pick the cut point for the window starting at `start`.
///
/// Only positions after `start + overlap` are eligible so the following
/// window makes progress; positions in the first half of the window are
/// skipped so chunks stay reasonably full.
fn find_boundary(
    chars: &[char],
    start: usize,
    hard_end: usize,
    size: usize,
    overlap: usize,
) -> usize {
    let min_end = start + (overlap + 1).max(size / 2);
    if min_end >= hard_end {
        return hard_end;
    }

    let paragraph = |i: usize| i >= 2 && chars[i - 1] == '\n' && chars[i - 2] == '\n';
    let line = |i: usize| chars[i - 1] == '\n';
    let sentence = |i: usize| {
        let prev = chars[i - 1];
        CJK_TERMINATORS.contains(&prev)
            || (SENTENCE_TERMINATORS.contains(&prev)
                && chars.get(i).is_none_or(|c| c.is_whitespace()))
    };
    let space = |i: usize| chars[i - 1].is_whitespace();

    last_match(min_end, hard_end, paragraph)
        .or_else(|| last_match(min_end, hard_end, line))
        .or_else(|| last_match(min_end, hard_end, sentence))
        .or_else(|| last_match(min_end, hard_end, space))
        .unwrap_or(hard_end)
}

fn last_match(lo: usize, hi: usize, pred: impl Fn(usize) -> bool) -> Option<usize> {
    (lo..=hi).rev().find(|&i| pred(i))
}
