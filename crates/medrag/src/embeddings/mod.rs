//! Embedding cache and content fingerprints

pub mod cache;
pub mod fingerprint;

pub use cache::{CacheStats, EmbeddingCache};
pub use fingerprint::Fingerprint;
