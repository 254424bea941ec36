//! Overlapping text windows for embedding.
//!
//! Every non-final window is `size` characters long unless it was pulled back
//! to a paragraph, line, sentence or word boundary. Pull-backs draw from a
//! shared slack budget so the window count stays
//! `ceil((len - overlap) / (size - overlap))` and the final window never
//! exceeds `size`. Consecutive windows always share exactly `overlap`
//! characters.

use crate::error::ConfigError;
use crate::models::{Chunk, IndexingConfig};
use crate::utils::text::truncate_chars;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Boundary {
    Word,
    Sentence,
    Line,
    Paragraph,
}

/// A source's chunks plus whether its text was cut before chunking.
#[derive(Debug, Clone)]
pub struct ChunkedText {
    pub chunks: Vec<Chunk>,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct TextChunker {
    size: usize,
    overlap: usize,
    max_chars: usize,
}

impl TextChunker {
    pub fn new(size: usize, overlap: usize, max_chars: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::ValidationError(
                "chunk size must be greater than 0".to_string(),
            ));
        }
        if overlap >= size {
            return Err(ConfigError::ValidationError(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({size})"
            )));
        }
        Ok(Self {
            size,
            overlap,
            max_chars,
        })
    }

    pub fn from_config(config: &IndexingConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.chunk_size as usize,
            config.chunk_overlap as usize,
            config.max_source_chars as usize,
        )
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Number of windows produced for a text of `len` characters.
    pub fn expected_count(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        if len <= self.size {
            return 1;
        }
        let step = self.size - self.overlap;
        (len - self.overlap).div_ceil(step)
    }

    /// Split `text` into `(start, end)` character spans.
    pub fn spans(&self, text: &str) -> Vec<(usize, usize)> {
        let chars: Vec<char> = text.chars().collect();
        self.spans_of(&chars)
    }

    fn spans_of(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let len = chars.len();
        let count = self.expected_count(len);
        if count == 0 {
            return Vec::new();
        }

        let step = self.size - self.overlap;
        let mut budget = (count * step + self.overlap).saturating_sub(len);
        let mut spans = Vec::with_capacity(count);
        let mut start = 0;

        for _ in 1..count {
            let hard_end = start + self.size;
            let floor = hard_end
                .saturating_sub(budget)
                .max(start + self.overlap + 1);
            let end = best_boundary(chars, floor, hard_end).unwrap_or(hard_end);

            budget -= hard_end - end;
            spans.push((start, end));
            start = end - self.overlap;
        }
        spans.push((start, len));

        spans
    }

    /// Chunk a source's text. `source_id` seeds the deterministic chunk ids.
    pub fn chunk(&self, source_id: &str, text: &str) -> ChunkedText {
        let (text, truncated) = truncate_chars(text, self.max_chars);
        let chars: Vec<char> = text.chars().collect();

        let chunks = self
            .spans_of(&chars)
            .into_iter()
            .enumerate()
            .map(|(ordinal, (start, end))| {
                let ordinal = ordinal as u32;
                Chunk {
                    id: Chunk::generate_id(source_id, ordinal),
                    source_id: source_id.to_string(),
                    ordinal,
                    text: chars[start..end].iter().collect(),
                    start_offset: start,
                    end_offset: end,
                }
            })
            .collect();

        ChunkedText { chunks, truncated }
    }
}

/// Latest cut position in `[floor, ceil]` of the strongest boundary class.
fn best_boundary(chars: &[char], floor: usize, ceil: usize) -> Option<usize> {
    let mut best: Option<(Boundary, usize)> = None;
    for pos in floor..=ceil {
        if let Some(kind) = boundary_at(chars, pos) {
            match best {
                Some((current, _)) if current > kind => {}
                _ => best = Some((kind, pos)),
            }
        }
    }
    best.map(|(_, pos)| pos)
}

/// Classify a cut made just before `chars[pos]`.
fn boundary_at(chars: &[char], pos: usize) -> Option<Boundary> {
    if pos == 0 || pos > chars.len() {
        return None;
    }
    let prev = chars[pos - 1];
    match prev {
        '\n' if pos >= 2 && chars[pos - 2] == '\n' => Some(Boundary::Paragraph),
        '\n' => Some(Boundary::Line),
        '.' | '!' | '?' if chars.get(pos).is_none_or(|c| c.is_whitespace()) => {
            Some(Boundary::Sentence)
        }
        ' ' | '\t' => Some(Boundary::Word),
        _ => None,
    }
}
