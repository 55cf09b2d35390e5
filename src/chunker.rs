//! Splits the joined document text into bounded chunks for the inference
//! service.
//!
//! Chunks are contiguous and never overlap: concatenating every chunk's text
//! in order reproduces the input exactly. Lengths are counted in characters so
//! a chunk boundary never falls inside a UTF-8 code point.

use crate::schema::{Chunk, TextSegment};

pub const DEFAULT_MAX_CHUNK_LEN: usize = 3500;
pub const DEFAULT_MIN_CHUNK_LEN: usize = 200;

const SEGMENT_SEPARATOR: &str = "\n\n";

/// Joins producer segments into the single text the splitter works on.
pub fn join_segments(segments: &[TextSegment]) -> String {
    segments.join(SEGMENT_SEPARATOR)
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkSplitter<'a> {
    text: &'a str,
    max_len: usize,
    min_len: usize,
}

impl<'a> ChunkSplitter<'a> {
    pub fn new(text: &'a str, max_len: usize, min_len: usize) -> Self {
        Self {
            text,
            max_len: max_len.max(1),
            min_len,
        }
    }

    /// A fresh pass over the chunks. Can be called any number of times.
    pub fn chunks(&self) -> Chunks<'a> {
        Chunks {
            text: self.text,
            max_len: self.max_len,
            min_len: self.min_len,
            pos: 0,
            index: 0,
        }
    }
}

pub struct Chunks<'a> {
    text: &'a str,
    max_len: usize,
    min_len: usize,
    pos: usize,
    index: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.pos >= self.text.len() {
            return None;
        }

        let rest = &self.text[self.pos..];
        let end = rest
            .char_indices()
            .nth(self.max_len)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let piece = &rest[..end];

        let chunk = Chunk {
            index: self.index,
            offset: self.pos,
            text: piece.to_string(),
            skip: piece.trim().chars().count() < self.min_len,
        };

        self.pos += end;
        self.index += 1;
        Some(chunk)
    }
}

pub fn split_into_chunks(text: &str, max_len: usize, min_len: usize) -> Vec<Chunk> {
    ChunkSplitter::new(text, max_len, min_len).chunks().collect()
}
