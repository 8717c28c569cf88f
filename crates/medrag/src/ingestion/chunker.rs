//! Token-budgeted text chunking with sentence awareness and offset tracking

use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

/// A whitespace-delimited token with its position in the source text
#[derive(Debug, Clone, Copy)]
struct Token {
    char_start: usize,
    byte_start: usize,
}

/// Tokenized view of a document
struct Tokenized {
    tokens: Vec<Token>,
    total_chars: usize,
}

/// Text chunker with configurable token budget and overlap
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum tokens per chunk
    max_tokens: usize,
    /// Tokens shared by consecutive chunks
    overlap_tokens: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(max_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            max_tokens,
            overlap_tokens,
        }
    }

    /// Create a chunker from configuration
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.max_tokens, config.overlap_tokens)
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn overlap_tokens(&self) -> usize {
        self.overlap_tokens
    }

    /// Chunk a document
    ///
    /// Chunks end on the last sentence or paragraph boundary that fits the
    /// token budget, and are hard-cut at `max_tokens` when no boundary fits.
    /// Consecutive chunks share exactly `overlap_tokens` tokens and their
    /// character ranges cover the whole document.
    pub fn chunk(&self, doc: &Document) -> Result<Vec<Chunk>> {
        if self.overlap_tokens >= self.max_tokens {
            return Err(Error::invalid_document(
                &doc.title,
                format!(
                    "overlap_tokens ({}) must be smaller than max_tokens ({})",
                    self.overlap_tokens, self.max_tokens
                ),
            ));
        }

        let text = doc.text.as_str();
        let Tokenized { tokens, total_chars } = tokenize(text);
        if tokens.is_empty() {
            return Err(Error::invalid_document(&doc.title, "document text is empty"));
        }

        let boundaries = sentence_boundaries(text, &tokens);
        let n = tokens.len();
        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            let end = self.chunk_end(start, n, &boundaries);

            let (char_start, byte_start) = if start == 0 {
                (0, 0)
            } else {
                (tokens[start].char_start, tokens[start].byte_start)
            };
            let (char_end, byte_end) = if end == n {
                (total_chars, text.len())
            } else {
                (tokens[end].char_start, tokens[end].byte_start)
            };

            chunks.push(Chunk::new(
                doc.id,
                chunks.len() as u32,
                text[byte_start..byte_end].to_string(),
                char_start..char_end,
                start..end,
            ));

            if end == n {
                break;
            }
            start = end - self.overlap_tokens;
        }

        tracing::debug!(
            "Chunked '{}' into {} chunks ({} tokens)",
            doc.title,
            chunks.len(),
            n
        );

        Ok(chunks)
    }

    /// Chunk a batch of documents, skipping invalid ones
    pub fn chunk_all(&self, docs: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in docs {
            match self.chunk(doc) {
                Ok(doc_chunks) => chunks.extend(doc_chunks),
                Err(e) => tracing::warn!("Skipping document '{}': {}", doc.title, e),
            }
        }
        chunks
    }

    /// End token (exclusive) of the chunk starting at `start`
    fn chunk_end(&self, start: usize, n: usize, boundaries: &[usize]) -> usize {
        let hard_end = (start + self.max_tokens).min(n);
        if hard_end == n {
            return n;
        }

        // The boundary must leave room past the overlap so the next chunk advances
        let floor = start + self.overlap_tokens;
        let fitting = boundaries.partition_point(|&b| b <= hard_end);
        match boundaries[..fitting].last() {
            Some(&b) if b > floor => b,
            _ => hard_end,
        }
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

/// Split text into whitespace-delimited tokens
fn tokenize(text: &str) -> Tokenized {
    let mut tokens = Vec::new();
    let mut in_token = false;
    let mut total_chars = 0usize;

    for (char_idx, (byte_idx, ch)) in text.char_indices().enumerate() {
        total_chars = char_idx + 1;
        if ch.is_whitespace() {
            in_token = false;
        } else if !in_token {
            in_token = true;
            tokens.push(Token {
                char_start: char_idx,
                byte_start: byte_idx,
            });
        }
    }

    Tokenized {
        tokens,
        total_chars,
    }
}

/// Token indices at which a new sentence or paragraph begins, ascending
fn sentence_boundaries(text: &str, tokens: &[Token]) -> Vec<usize> {
    let mut boundaries: Vec<usize> = text
        .split_sentence_bound_indices()
        .map(|(byte_offset, _)| tokens.partition_point(|t| t.byte_start < byte_offset))
        .filter(|&idx| idx > 0 && idx < tokens.len())
        .collect();
    boundaries.dedup();
    boundaries
}
