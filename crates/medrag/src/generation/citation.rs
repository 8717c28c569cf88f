//! Citation marker linking
//!
//! Every `[n]` marker in generated text is resolved against the retrieval
//! result it was prompted with. Markers that resolve become citations;
//! markers that do not are reported and removed or flagged. Nothing is ever
//! cited that the generator did not mark.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Citation, CitationWarning, RetrievalResult};

use super::UngroundedPolicy;

static MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("valid marker regex"));

/// Replacement text for flagged markers
pub const UNVERIFIED_MARKER: &str = "[unverified]";

/// Generated text after citation linking
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedAnswer {
    pub text: String,
    /// One per distinct grounded marker, in order of first appearance
    pub citations: Vec<Citation>,
    pub warnings: Vec<CitationWarning>,
}

/// Resolve the markers in `raw` against `retrieval`
pub fn link_citations(
    raw: &str,
    retrieval: &RetrievalResult,
    policy: UngroundedPolicy,
) -> LinkedAnswer {
    let mut text = String::with_capacity(raw.len());
    let mut citations: Vec<Citation> = Vec::new();
    let mut warnings = Vec::new();
    let mut last = 0;

    for caps in MARKER.captures_iter(raw) {
        let Some(whole) = caps.get(0) else { continue };
        let hit = caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|n| retrieval.by_marker(n).map(|hit| (n, hit)));

        match hit {
            Some((n, hit)) => {
                text.push_str(&raw[last..whole.end()]);
                if !citations.iter().any(|c| c.reference == n) {
                    citations.push(Citation::from_hit(n, hit));
                }
            }
            None => {
                tracing::warn!(
                    "Generator cited {} but only {} sources were retrieved",
                    whole.as_str(),
                    retrieval.len()
                );
                warnings.push(CitationWarning::UngroundedCitation {
                    marker: whole.as_str().to_string(),
                    position: whole.start(),
                });

                let before = &raw[last..whole.start()];
                match policy {
                    UngroundedPolicy::Drop => {
                        // "claim [9]." reads as "claim."
                        text.push_str(before.strip_suffix(' ').unwrap_or(before));
                    }
                    UngroundedPolicy::Flag => {
                        text.push_str(before);
                        text.push_str(UNVERIFIED_MARKER);
                    }
                }
            }
        }
        last = whole.end();
    }
    text.push_str(&raw[last..]);

    LinkedAnswer {
        text,
        citations,
        warnings,
    }
}
