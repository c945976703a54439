//! Sliding-window text chunker.
//!
//! Splits extracted document text into overlapping fixed-size [`Chunk`]s.
//! Windows are measured in characters (never splitting a UTF-8 sequence)
//! and each chunk records the byte range it covers in the source text,
//! plus a SHA-256 hash of its content.
//!
//! # Algorithm
//!
//! 1. `stride = chunk_size - overlap` (must be > 0).
//! 2. Windows start at char offsets `0, stride, 2·stride, …` while the start
//!    is still inside the text.
//! 3. Each window covers `min(chunk_size, remaining)` chars.
//!
//! The final window may lie entirely inside the previous one when the text
//! ends within the overlap region; it is still emitted so that every start
//! position of the stride sequence is represented.
//!
//! # Example
//!
//! ```rust
//! use docvault_core::chunk::{chunk_text, ChunkParams};
//! use docvault_core::models::DocumentId;
//!
//! let chunks = chunk_text(DocumentId(1), "Patient has diabetes.", &ChunkParams::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "Patient has diabetes.");
//! ```

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::{Chunk, DocumentId};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_OVERLAP: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk_size must be > 0")]
    ZeroChunkSize,
    #[error("overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Validated window parameters. Construct with [`ChunkParams::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkParams {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between consecutive window starts. Always > 0.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Split `text` into overlapping windows.
///
/// Pure function of `(text, params)`: the same input always yields the same
/// sequence. Empty text yields no chunks.
pub fn chunk_text(document_id: DocumentId, text: &str, params: &ChunkParams) -> Vec<Chunk> {
    // Byte offset of every char boundary, including the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;

    (0..char_len)
        .step_by(params.stride())
        .enumerate()
        .map(|(index, start)| {
            let end = (start + params.chunk_size).min(char_len);
            let range = bounds[start]..bounds[end];
            make_chunk(document_id, index, &text[range.clone()], range)
        })
        .collect()
}

fn make_chunk(
    document_id: DocumentId,
    index: usize,
    text: &str,
    range: std::ops::Range<usize>,
) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        document_id,
        chunk_index: index,
        text: text.to_string(),
        range,
        hash,
    }
}
