//! Cleaning collaborator: turns raw source files into cleaned documents
//!
//! Format-specific parsers (PDF, DOCX, PPTX, NXML) live outside this crate and
//! plug in through [`DocumentCleaner`]. [`PlainTextCleaner`] handles text and
//! Markdown files already extracted from those formats.

use chrono::{DateTime, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::types::{Document, TrustTier};

/// Produces cleaned documents from a directory of raw files
pub trait DocumentCleaner: Send + Sync {
    /// Clean every accepted file under `input_dir`. Files that fail to clean
    /// are skipped; only a failure to read the directory itself is an error.
    fn clean(&self, input_dir: &Path) -> Result<Vec<Document>>;

    /// Get cleaner name for logging
    fn name(&self) -> &str;
}

static HYPHENATED_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w)-\n(\w)").expect("valid hyphenation regex"));
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n\s*").expect("valid paragraph regex"));

/// Cleaner for `.txt` and `.md` files
pub struct PlainTextCleaner {
    default_tier: TrustTier,
}

impl PlainTextCleaner {
    /// File extensions this cleaner accepts
    pub const EXTENSIONS: &'static [&'static str] = &["txt", "md", "markdown"];

    /// Create a cleaner that assigns `default_tier` when no tier directory is found
    pub fn new(default_tier: TrustTier) -> Self {
        Self { default_tier }
    }

    /// Clean a single file
    pub fn clean_file(&self, input_dir: &Path, path: &Path) -> Result<Document> {
        let raw = std::fs::read_to_string(path)?;
        let text = clean_text(&raw);
        if text.trim().is_empty() {
            return Err(Error::invalid_document(
                path.display().to_string(),
                "no text after cleaning",
            ));
        }

        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .trim()
            .to_string();

        Ok(Document::new(
            title,
            path.display().to_string(),
            retrieval_date(path),
            text,
            self.tier_for(input_dir, path),
        ))
    }

    /// Trust tier from the nearest ancestor directory with a tier name
    fn tier_for(&self, input_dir: &Path, path: &Path) -> TrustTier {
        let relative = path.strip_prefix(input_dir).unwrap_or(path);
        relative
            .parent()
            .into_iter()
            .flat_map(|p| p.components().rev())
            .filter_map(|c| c.as_os_str().to_str())
            .find_map(TrustTier::from_dir_name)
            .unwrap_or(self.default_tier)
    }

    fn accepts(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| Self::EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl Default for PlainTextCleaner {
    fn default() -> Self {
        Self::new(TrustTier::default())
    }
}

impl DocumentCleaner for PlainTextCleaner {
    fn clean(&self, input_dir: &Path) -> Result<Vec<Document>> {
        if !input_dir.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input directory {} does not exist", input_dir.display()),
            )));
        }

        tracing::info!("Cleaning documents under {}", input_dir.display());

        let mut docs = Vec::new();
        // Sorted so the cleaned set is stable across runs
        for entry in WalkDir::new(input_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.file_name().map_or(false, |n| n == ".gitkeep") {
                continue;
            }
            if !Self::accepts(path) {
                tracing::debug!("Ignoring unsupported file {}", path.display());
                continue;
            }

            match self.clean_file(input_dir, path) {
                Ok(doc) => docs.push(doc),
                Err(e) => tracing::warn!("Error cleaning {}: {}. Skipping...", path.display(), e),
            }
        }

        tracing::info!("Cleaned {} documents", docs.len());
        Ok(docs)
    }

    fn name(&self) -> &str {
        "plain-text"
    }
}

/// Normalize extracted text
///
/// Joins words hyphenated across a line break and unwraps single line breaks
/// inside paragraphs. Paragraph breaks are kept as a blank line.
pub fn clean_text(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n");
    let text = HYPHENATED_BREAK.replace_all(&text, "$1$2");

    PARAGRAPH_BREAK
        .split(text.trim())
        .map(|para| {
            para.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|para| !para.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn retrieval_date(path: &Path) -> NaiveDate {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Local>::from(t).date_naive())
        .unwrap_or_else(|_| Local::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_clean_text_joins_hyphenation_and_lines() {
        let raw = "The micro-\nscope shows\ncells.\n\nSecond para\r\ncontinues.";
        assert_eq!(
            clean_text(raw),
            "The microscope shows cells.\n\nSecond para continues."
        );
    }

    #[test]
    fn test_clean_directory() {
        let dir = tempfile::tempdir().unwrap();
        let guidelines = dir.path().join("guidelines");
        fs::create_dir_all(&guidelines).unwrap();
        fs::write(guidelines.join("hypertension.txt"), "Target BP is\nbelow 130/80.").unwrap();
        fs::write(dir.path().join("anatomy.md"), "# Heart\n\nFour chambers.").unwrap();
        fs::write(dir.path().join("empty.txt"), "   \n").unwrap();
        fs::write(dir.path().join("slides.pptx"), [0u8, 1, 2]).unwrap();
        fs::write(dir.path().join(".gitkeep"), "").unwrap();

        let docs = PlainTextCleaner::default().clean(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);

        let htn = docs.iter().find(|d| d.title == "hypertension").unwrap();
        assert_eq!(htn.trust_tier, TrustTier::Guideline);
        assert_eq!(htn.text, "Target BP is below 130/80.");

        let anatomy = docs.iter().find(|d| d.title == "anatomy").unwrap();
        assert_eq!(anatomy.trust_tier, TrustTier::Textbook);
    }

    #[test]
    fn test_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = PlainTextCleaner::default().clean(&dir.path().join("nope"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
