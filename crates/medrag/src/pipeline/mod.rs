//! Pipeline orchestration: clean, vectorize, then answer questions

pub mod artifacts;
pub mod orchestrator;
pub mod query;

use std::fmt;

pub use artifacts::ArtifactStore;
pub use orchestrator::{Pipeline, PipelineOutput, RunStats};
pub use query::{QueryEngine, QueryResponse};

/// Pipeline stage, as named in stage flags and artifact errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Raw files to cleaned documents
    Clean,
    /// Cleaned documents to chunks, embeddings and the vector index
    Vectorize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Clean => f.write_str("clean"),
            Stage::Vectorize => f.write_str("vectorize"),
        }
    }
}
