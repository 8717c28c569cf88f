//! Prompt templates for grounded answers

use crate::types::{response::format_marker, RetrievalResult};

/// Prompt builder for RAG queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Render retrieved chunks, each under its citation marker
    pub fn build_context(result: &RetrievalResult) -> String {
        let mut context = String::new();

        for (i, hit) in result.iter().enumerate() {
            context.push_str(&format!(
                "{} {} ({}, retrieved {})\n{}\n\n---\n\n",
                format_marker(i + 1),
                hit.document.title,
                hit.document.trust_tier,
                hit.document.retrieved_at,
                hit.chunk.content.trim()
            ));
        }

        context
    }

    /// Build the full prompt with grounding rules
    pub fn build_prompt(question: &str, result: &RetrievalResult) -> String {
        let context = Self::build_context(result);
        let last = result.len();

        format!(
            r#"You are a medical education assistant that ONLY uses information from the provided sources.

GROUNDING RULES:
1. Use only information explicitly stated in the SOURCES below
2. Cite every claim with the marker of its source, for example {first}
3. Valid markers are {first} to {last_marker}; never cite any other number
4. If the sources do not answer the question, say "The provided sources do not cover this question."
5. Prefer Guideline sources over Textbook and Peer-reviewed sources when they disagree

SOURCES:
{context}
QUESTION: {question}

Answer using only the sources above, with citation markers:"#,
            first = format_marker(1),
            last_marker = format_marker(last.max(1)),
            context = context,
            question = question.trim(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, Document, ScoredChunk, TrustTier};
    use chrono::NaiveDate;

    fn result() -> RetrievalResult {
        let hits = [("Hypertension Guideline", "Target below 130/80."), ("Cardiology", "ACE inhibitors lower BP.")]
            .iter()
            .map(|(title, text)| {
                let doc = Document::new(
                    *title,
                    format!("{}.txt", title),
                    NaiveDate::from_ymd_opt(2023, 9, 1).unwrap(),
                    *text,
                    TrustTier::Guideline,
                );
                ScoredChunk {
                    chunk: Chunk::new(doc.id, 0, text.to_string(), 0..text.len(), 0..3),
                    document: doc.meta(),
                    score: 0.8,
                }
            })
            .collect();
        RetrievalResult::new(hits)
    }

    #[test]
    fn test_context_tags_chunks_in_order() {
        let context = PromptBuilder::build_context(&result());
        let first = context.find("[1] Hypertension Guideline (Guideline").unwrap();
        let second = context.find("[2] Cardiology").unwrap();
        assert!(first < second);
        assert!(context.contains("Target below 130/80."));
    }

    #[test]
    fn test_prompt_contains_question_and_marker_range() {
        let prompt = PromptBuilder::build_prompt("  What is the BP target? ", &result());
        assert!(prompt.contains("QUESTION: What is the BP target?"));
        assert!(prompt.contains("[1] to [2]"));
    }
}
