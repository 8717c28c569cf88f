//! Core types for documents, chunks, retrieval and answers

pub mod document;
pub mod response;

pub use document::{Chunk, Document, DocumentMeta, TrustTier};
pub use response::{Citation, CitationWarning, CitedAnswer, RetrievalResult, ScoredChunk};
