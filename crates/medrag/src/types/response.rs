//! Retrieval and answer types

use serde::{Deserialize, Serialize};
use std::ops::Range;
use uuid::Uuid;

use super::document::{Chunk, DocumentMeta};

/// A retrieved chunk with its similarity to the query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The retrieved chunk
    pub chunk: Chunk,
    /// Metadata of the owning document
    pub document: DocumentMeta,
    /// Cosine similarity (-1.0 to 1.0, higher is more similar)
    pub score: f32,
}

/// Ranked retrieval output, highest score first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn new(hits: Vec<ScoredChunk>) -> Self {
        Self { hits }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredChunk> {
        self.hits.iter()
    }

    /// Hit referenced by a 1-based citation marker
    pub fn by_marker(&self, marker: usize) -> Option<&ScoredChunk> {
        marker.checked_sub(1).and_then(|i| self.hits.get(i))
    }

    /// Scores in rank order
    pub fn scores(&self) -> Vec<f32> {
        self.hits.iter().map(|h| h.score).collect()
    }
}

/// One entry of an answer's citation list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// Marker as it appears in the answer text, e.g. `[2]`
    pub marker: String,
    /// 1-based position of the cited chunk in the retrieval result
    pub reference: usize,
    /// Chunk ID
    pub chunk_id: Uuid,
    /// Document ID
    pub document_id: Uuid,
    /// Document title
    pub title: String,
    /// Path or URL of the document
    pub source: String,
    /// Character offsets of the chunk in the document
    pub char_range: Range<usize>,
    /// Similarity score of the chunk
    pub similarity_score: f32,
}

impl Citation {
    /// Create a citation for the hit at 1-based `reference`
    pub fn from_hit(reference: usize, hit: &ScoredChunk) -> Self {
        Self {
            marker: format_marker(reference),
            reference,
            chunk_id: hit.chunk.id,
            document_id: hit.chunk.document_id,
            title: hit.document.title.clone(),
            source: hit.document.source.clone(),
            char_range: hit.chunk.char_range.clone(),
            similarity_score: hit.score,
        }
    }

    /// Format citation for a reference list
    pub fn format_reference(&self) -> String {
        format!(
            "{} {}, chars {}-{}",
            self.marker, self.title, self.char_range.start, self.char_range.end
        )
    }
}

/// Render a citation marker
pub fn format_marker(reference: usize) -> String {
    format!("[{}]", reference)
}

/// Data-quality warnings attached to an answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CitationWarning {
    /// The generator cited a source that was not retrieved
    UngroundedCitation {
        /// The marker as generated
        marker: String,
        /// Byte offset of the marker in the raw generated text
        position: usize,
    },
}

/// Generated answer with an exhaustive marker-to-source mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitedAnswer {
    /// Question that was asked
    pub question: String,
    /// Answer text with citation markers, followed by the disclaimer
    pub text: String,
    /// One entry per distinct marker in `text`, in order of first appearance
    pub citations: Vec<Citation>,
    /// Problems found while linking citations
    pub warnings: Vec<CitationWarning>,
}

impl CitedAnswer {
    /// True when no ungrounded citations were found
    pub fn is_grounded(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Distinct titles of cited documents, in citation order
    pub fn references(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for citation in &self.citations {
            if !seen.contains(&citation.title.as_str()) {
                seen.push(citation.title.as_str());
            }
        }
        seen
    }
}
