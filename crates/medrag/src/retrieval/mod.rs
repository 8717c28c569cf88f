//! Vector index and retrieval

pub mod index;
pub mod search;

pub use index::{chunk_set_fingerprint, IndexEntry, VectorIndex};
pub use search::Retriever;
