//! Overlapping, size-bounded text chunking.
//!
//! `split` is a pure function of `(text, config)`: it greedily scans for a
//! natural break (paragraph, sentence end, newline, space) inside a window
//! at the tail of each target-sized slice, hard-splitting only when none
//! exists. Every chunk after the first starts `overlap` characters before
//! the previous chunk's end so adjacent chunks share context.
//!
//! All offsets are character offsets into the input; the offset ranges of
//! the produced chunks cover the input with no gaps.

use serde::{Deserialize, Serialize};

use crate::core::config::ChunkingConfig;
use crate::core::errors::RagError;

/// A contiguous slice of the source text, pre-embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    /// Stable position within the document, starting at 0.
    pub chunk_index: usize,
    /// Character offset of the first character (inclusive).
    pub start_offset: usize,
    /// Character offset one past the last character (exclusive).
    pub end_offset: usize,
}

/// Fraction of the target size searched for a natural break point.
const BOUNDARY_WINDOW_RATIO: f64 = 0.3;

/// Split `text` into overlapping chunks.
///
/// Returns an empty vector for empty input. Fails with
/// [`RagError::InvalidConfig`] when the config is incoherent
/// (`overlap >= target_size` or `target_size == 0`).
pub fn split(text: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>, RagError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let target = config.target_size;
    let overlap = config.overlap;
    let window = ((target as f64 * BOUNDARY_WINDOW_RATIO).ceil() as usize).max(1);

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;

    while start < total {
        let hard_end = (start + target).min(total);
        let mut end = hard_end;

        if hard_end < total {
            if let Some(cut) = find_break(&chars, start, hard_end, window) {
                end = cut;
            }
            // a break too close to the start would stall the scan
            if end <= start + overlap {
                end = hard_end;
            }
        }

        chunks.push(TextChunk {
            text: chars[start..end].iter().collect(),
            chunk_index: index,
            start_offset: start,
            end_offset: end,
        });
        index += 1;

        if end >= total {
            break;
        }
        start = end - overlap;
    }

    Ok(chunks)
}

/// Find the best break point in the last `window` characters of
/// `[start, hard_end)`. Returns the cut position (exclusive end), preferring
/// paragraph breaks, then sentence ends, then any newline or space.
fn find_break(chars: &[char], start: usize, hard_end: usize, window: usize) -> Option<usize> {
    let search_from = hard_end.saturating_sub(window).max(start);

    let mut paragraph = None;
    let mut sentence = None;
    let mut soft = None;

    for pos in (search_from..hard_end).rev() {
        let c = chars[pos];
        if paragraph.is_none() && c == '\n' && pos > 0 && chars[pos - 1] == '\n' {
            paragraph = Some(pos + 1);
        }
        if sentence.is_none()
            && matches!(c, '.' | '!' | '?')
            && chars.get(pos + 1).is_some_and(|n| n.is_whitespace())
        {
            sentence = Some(pos + 2);
        }
        if soft.is_none() && (c == '\n' || c == ' ') {
            soft = Some(pos + 1);
        }
    }

    paragraph
        .or(sentence)
        .or(soft)
        .filter(|&cut| cut > start && cut <= hard_end)
}
