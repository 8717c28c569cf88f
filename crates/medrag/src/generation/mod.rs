//! Grounded answer generation with citation handling

pub mod assembler;
pub mod citation;
pub mod prompt;

use serde::{Deserialize, Serialize};

pub use assembler::AnswerAssembler;
pub use citation::{link_citations, LinkedAnswer};
pub use prompt::PromptBuilder;

/// What to do with a marker that cites a source outside the retrieval result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UngroundedPolicy {
    /// Remove the marker from the answer text
    #[default]
    Drop,
    /// Replace the marker with `[unverified]`
    Flag,
}
