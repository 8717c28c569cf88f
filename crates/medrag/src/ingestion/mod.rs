//! Document cleaning and chunking

mod chunker;
pub mod cleaner;

pub use chunker::TextChunker;
pub use cleaner::{clean_text, DocumentCleaner, PlainTextCleaner};
