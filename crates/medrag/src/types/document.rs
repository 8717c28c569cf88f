//! Document and chunk types with provenance tracking for citations

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use uuid::Uuid;

/// How much a source is trusted, in descending order of authority
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TrustTier {
    /// Clinical practice guideline
    Guideline,
    /// Reference textbook
    #[default]
    Textbook,
    /// Peer-reviewed article
    PeerReviewed,
}

impl TrustTier {
    /// Detect the tier from a directory name such as `guidelines` or `peer-reviewed`
    pub fn from_dir_name(name: &str) -> Option<Self> {
        match name.to_lowercase().replace('_', "-").as_str() {
            "guideline" | "guidelines" => Some(Self::Guideline),
            "textbook" | "textbooks" => Some(Self::Textbook),
            "peer-reviewed" | "peerreviewed" | "articles" => Some(Self::PeerReviewed),
            _ => None,
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Guideline => "Guideline",
            Self::Textbook => "Textbook",
            Self::PeerReviewed => "Peer-reviewed",
        }
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A cleaned document, ready for chunking. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable document ID, derived from `source`
    pub id: Uuid,
    /// Human-readable title (used in citations)
    pub title: String,
    /// Path or URL the document was retrieved from
    pub source: String,
    /// Date the source was retrieved
    pub retrieved_at: NaiveDate,
    /// Cleaned text
    pub text: String,
    /// Trust tier of the source
    pub trust_tier: TrustTier,
}

impl Document {
    /// Create a new document. The ID is a UUIDv5 of the source, so the same
    /// source always maps to the same document.
    pub fn new(
        title: impl Into<String>,
        source: impl Into<String>,
        retrieved_at: NaiveDate,
        text: impl Into<String>,
        trust_tier: TrustTier,
    ) -> Self {
        let source = source.into();
        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_URL, source.as_bytes()),
            title: title.into(),
            source,
            retrieved_at,
            text: text.into(),
            trust_tier,
        }
    }

    /// Metadata carried alongside every index entry
    pub fn meta(&self) -> DocumentMeta {
        DocumentMeta {
            title: self.title.clone(),
            source: self.source.clone(),
            retrieved_at: self.retrieved_at,
            trust_tier: self.trust_tier,
        }
    }
}

/// Document metadata without the text body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentMeta {
    pub title: String,
    pub source: String,
    pub retrieved_at: NaiveDate,
    pub trust_tier: TrustTier,
}

/// A chunk of text from a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Stable chunk ID, derived from the document ID and chunk index
    pub id: Uuid,
    /// Parent document ID
    pub document_id: Uuid,
    /// Chunk index within document
    pub chunk_index: u32,
    /// Exact text of `char_range` in the document
    pub content: String,
    /// Character offsets in the document (half-open)
    pub char_range: Range<usize>,
    /// Token offsets in the document (half-open)
    pub token_range: Range<usize>,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(
        document_id: Uuid,
        chunk_index: u32,
        content: String,
        char_range: Range<usize>,
        token_range: Range<usize>,
    ) -> Self {
        Self {
            id: Uuid::new_v5(&document_id, &chunk_index.to_be_bytes()),
            document_id,
            chunk_index,
            content,
            char_range,
            token_range,
        }
    }

    /// Number of tokens in the chunk
    pub fn token_count(&self) -> usize {
        self.token_range.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn test_document_id_is_stable() {
        let a = Document::new("A", "guidelines/htn.txt", date(), "x", TrustTier::Guideline);
        let b = Document::new("B", "guidelines/htn.txt", date(), "y", TrustTier::Textbook);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_chunk_id_depends_on_index() {
        let doc = Document::new("A", "a.txt", date(), "x", TrustTier::Guideline);
        let c0 = Chunk::new(doc.id, 0, "x".into(), 0..1, 0..1);
        let c0_again = Chunk::new(doc.id, 0, "x".into(), 0..1, 0..1);
        let c1 = Chunk::new(doc.id, 1, "x".into(), 0..1, 0..1);
        assert_eq!(c0.id, c0_again.id);
        assert_ne!(c0.id, c1.id);
    }

    #[test]
    fn test_trust_tier_from_dir_name() {
        assert_eq!(TrustTier::from_dir_name("Guidelines"), Some(TrustTier::Guideline));
        assert_eq!(TrustTier::from_dir_name("peer_reviewed"), Some(TrustTier::PeerReviewed));
        assert_eq!(TrustTier::from_dir_name("misc"), None);
    }
}
