//! Fixed-stride sliding-window text chunker.
//!
//! Splits extracted document text into overlapping windows of `size`
//! characters. Consecutive windows start `size - overlap` characters apart.
//! Each window is trimmed; windows that trim to nothing are dropped.
//!
//! # Algorithm
//!
//! 1. Start at offset 0.
//! 2. Take the characters `[start, start + size)` (clamped to the end).
//! 3. Trim surrounding whitespace and keep the window if non-empty.
//! 4. Advance `start` by `size - overlap`; stop once `start >= len`.
//!
//! Offsets count `char`s, so a window never splits a UTF-8 code point.
//!
//! # Example
//!
//! ```rust
//! use doco_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("abcdefghij", 4, 1).unwrap();
//! assert_eq!(chunks, vec!["abcd", "defg", "ghij", "j"]);
//! ```

use thiserror::Error;

/// Window size used by the ingestion pipeline.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Overlap between consecutive windows used by the ingestion pipeline.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Split `text` into trimmed, overlapping windows.
///
/// # Errors
///
/// Returns [`ChunkError::InvalidArgument`] when `size == 0` or
/// `overlap >= size`; either would stall the window advance.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>, ChunkError> {
    if size == 0 {
        return Err(ChunkError::InvalidArgument(
            "chunk size must be > 0".to_string(),
        ));
    }
    if overlap >= size {
        return Err(ChunkError::InvalidArgument(format!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            overlap, size
        )));
    }

    // Byte offset of every char boundary, plus the end of the string.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let len = bounds.len();
    bounds.push(text.len());

    let stride = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let end = (start + size).min(len);
        let window = text[bounds[start]..bounds[end]].trim();
        if !window.is_empty() {
            chunks.push(window.to_string());
        }
        start += stride;
    }

    Ok(chunks)
}
