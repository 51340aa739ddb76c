//! Boundary-aware text chunker with overlap.
//!
//! Splits normalized document text into [`Chunk`]s of roughly `size`
//! characters. Each chunk after the first repeats the trailing `overlap`
//! characters of its predecessor so that a concept straddling a boundary is
//! retrievable from either side.
//!
//! # Algorithm
//!
//! 1. If the remaining text fits in `size` characters, emit it and stop.
//! 2. Otherwise look backwards from `start + size` down to 70% of the target
//!    for a break: paragraph (`\n\n`) first, then sentence end, then
//!    whitespace. The candidate nearest the target wins within its class.
//! 3. If the window has no break, scan forward up to the hard ceiling
//!    `start + 2 × size` for the nearest break of any class.
//! 4. If there is still none, cut at exactly `size` characters.
//! 5. The next chunk starts `overlap` characters before the previous end.
//!
//! Offsets are character offsets, never byte offsets, so multi-byte text is
//! sliced on valid boundaries.
//!
//! # Example
//!
//! ```rust
//! use docsage_core::chunk::{chunk_text, reconstruct, ChunkParams};
//!
//! let params = ChunkParams::new(500, 100).unwrap();
//! let text = "a".repeat(1200);
//! let chunks = chunk_text("doc-1", &text, &params);
//! let ranges: Vec<_> = chunks.iter().map(|c| (c.char_start, c.char_end)).collect();
//! assert_eq!(ranges, vec![(0, 500), (400, 900), (800, 1200)]);
//! assert_eq!(reconstruct(&chunks), text);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::models::Chunk;

/// Lower edge of the backward search window, in tenths of `size`.
const MIN_FILL_TENTHS: usize = 7;

/// Validated chunking parameters, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub size: usize,
    pub overlap: usize,
}

impl ChunkParams {
    /// `size` must be positive and `overlap` at most half of it, which keeps
    /// every step moving forward.
    pub fn new(size: usize, overlap: usize) -> PipelineResult<Self> {
        if size == 0 {
            return Err(PipelineError::InvalidInput(
                "chunk size must be > 0".to_string(),
            ));
        }
        if overlap > size / 2 {
            return Err(PipelineError::InvalidInput(format!(
                "chunk overlap ({}) must be at most half the chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self { size, overlap })
    }

    /// Hard ceiling on a single chunk's length.
    pub fn ceiling(&self) -> usize {
        self.size * 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BreakClass {
    Word,
    Sentence,
    Paragraph,
}

/// Split text into overlapping chunks with contiguous ordinals from 0.
///
/// Empty or whitespace-only text yields no chunks. The output is a pure
/// function of `(text, params)`; chunk ids are derived from the document id
/// and ordinal.
pub fn chunk_text(document_id: &str, text: &str, params: &ChunkParams) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut byte_at: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    byte_at.push(text.len());
    let n = chars.len();

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = if n - start <= params.size {
            n
        } else {
            find_break(&chars, start, params)
        };

        let piece = &text[byte_at[start]..byte_at[end]];
        chunks.push(make_chunk(document_id, chunks.len(), piece, start, end));

        if end == n {
            break;
        }
        start = end - params.overlap;
    }

    chunks
}

/// Rebuild the source text by concatenating chunks and dropping each
/// chunk's overlapped prefix.
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.char_start);
        out.extend(chunk.text.chars().skip(skip));
        covered = chunk.char_end;
    }
    out
}

/// Pick the exclusive end of the chunk beginning at `start`.
///
/// Only called when more than `size` characters remain.
fn find_break(chars: &[char], start: usize, params: &ChunkParams) -> usize {
    let n = chars.len();
    let target = start + params.size;
    let lo = start + (params.size * MIN_FILL_TENTHS / 10).max(params.overlap + 1);

    let mut best: Option<(BreakClass, usize)> = None;
    for p in (lo..=target).rev() {
        if let Some(class) = classify(chars, p) {
            let better = match best {
                None => true,
                Some((c, _)) => class > c,
            };
            if better {
                best = Some((class, p));
            }
            if class == BreakClass::Paragraph {
                break;
            }
        }
    }
    if let Some((_, p)) = best {
        return p;
    }

    let ceiling = (start + params.ceiling()).min(n);
    for p in (target + 1)..=ceiling {
        if classify(chars, p).is_some() {
            return p;
        }
    }

    target
}

/// Classify the cut position `p` (between `chars[p - 1]` and `chars[p]`).
fn classify(chars: &[char], p: usize) -> Option<BreakClass> {
    if p < 1 || p >= chars.len() {
        return None;
    }
    let prev = chars[p - 1];
    if !prev.is_whitespace() {
        return None;
    }
    if prev == '\n' && p >= 2 && chars[p - 2] == '\n' {
        return Some(BreakClass::Paragraph);
    }
    if prev == '\n' || (p >= 2 && is_sentence_terminal(chars[p - 2])) {
        return Some(BreakClass::Sentence);
    }
    Some(BreakClass::Word)
}

fn is_sentence_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？' | '…')
}

/// Create a single [`Chunk`] with a deterministic id and SHA-256 content hash.
fn make_chunk(document_id: &str, ordinal: usize, text: &str, start: usize, end: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let name = format!("{}:{}", document_id, ordinal);
    Chunk {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string(),
        document_id: document_id.to_string(),
        ordinal,
        text: text.to_string(),
        char_start: start,
        char_end: end,
        hash,
    }
}
