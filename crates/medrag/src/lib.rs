//! medrag: retrieval-augmented answers over trusted medical-education documents
//!
//! Cleaned documents are split into overlapping chunks, embedded through a
//! durable single-flight cache, and indexed for cosine search. Questions are
//! answered by a local LLM prompted with the retrieved chunks, and every
//! citation marker in the answer is checked against what was retrieved.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod retrieval;
pub mod types;

pub use config::RagConfig;
pub use embeddings::{EmbeddingCache, Fingerprint};
pub use error::{Error, Result};
pub use generation::{AnswerAssembler, UngroundedPolicy};
pub use ingestion::{DocumentCleaner, PlainTextCleaner, TextChunker};
pub use pipeline::{Pipeline, PipelineOutput, QueryEngine, Stage};
pub use providers::{EmbeddingProvider, LlmProvider, Providers};
pub use retrieval::{IndexEntry, Retriever, VectorIndex};
pub use types::{
    Chunk, Citation, CitationWarning, CitedAnswer, Document, DocumentMeta, RetrievalResult,
    ScoredChunk, TrustTier,
};
