//! Overlapping fixed-size character windows over a document.
//!
//! Lengths and offsets count `char`s, so a window never splits a multi-byte
//! character.

use serde::Serialize;

use crate::error::ChunkError;

pub const DEFAULT_CHUNK_SIZE: usize = 1200;
pub const DEFAULT_OVERLAP: usize = 150;

/// Window size and overlap. Always satisfies `chunk_size > overlap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkParams {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size <= overlap {
            return Err(ChunkError::InvalidParameters { chunk_size, overlap });
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between the starts of two consecutive windows.
    pub fn step(&self) -> usize {
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

/// One window of a document together with its position among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Chunker {
    params: ChunkParams,
}

impl Chunker {
    pub fn new(params: ChunkParams) -> Self {
        Self { params }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let normalized = text.trim();
        if normalized.is_empty() {
            return Vec::new();
        }

        // Byte offset of every char boundary, including the end of the text.
        let mut bounds: Vec<usize> = normalized.char_indices().map(|(i, _)| i).collect();
        let len = bounds.len();
        bounds.push(normalized.len());

        let step = self.params.step();
        let mut chunks = Vec::with_capacity(len.div_ceil(step));
        let mut start = 0;

        while start < len {
            let end = (start + self.params.chunk_size).min(len);
            chunks.push(normalized[bounds[start]..bounds[end]].to_string());
            start += step;
        }

        chunks
    }

    pub fn chunks(&self, text: &str) -> Vec<Chunk> {
        self.split(text)
            .into_iter()
            .enumerate()
            .map(|(index, content)| Chunk { index, content })
            .collect()
    }
}

/// Split `text` into overlapping windows of at most `chunk_size` characters.
///
/// Leading and trailing whitespace is stripped first; `None` and blank input
/// yield no chunks. Fails with [`ChunkError::InvalidParameters`] when
/// `chunk_size <= overlap`, before any text is examined.
pub fn chunk_text<'a>(
    text: impl Into<Option<&'a str>>,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkError> {
    let params = ChunkParams::new(chunk_size, overlap)?;
    Ok(Chunker::new(params).split(text.into().unwrap_or_default()))
}
