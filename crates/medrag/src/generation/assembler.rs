//! Answer assembly: prompt, generate, link citations, append disclaimer

use chrono::NaiveDate;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::AnswerConfig;
use crate::error::{Error, Result};
use crate::providers::{LlmProvider, RetryPolicy};
use crate::types::{CitedAnswer, RetrievalResult};

use super::citation::link_citations;
use super::prompt::PromptBuilder;
use super::UngroundedPolicy;

/// Answer text used when retrieval found nothing to ground on
pub const NO_SOURCES_ANSWER: &str = "The provided sources do not cover this question.";

/// Builds cited answers from retrieval results
#[derive(Debug, Clone)]
pub struct AnswerAssembler {
    retry: RetryPolicy,
    generation_timeout: Duration,
    policy: UngroundedPolicy,
    as_of: Option<NaiveDate>,
}

impl AnswerAssembler {
    pub fn new(config: &AnswerConfig, retry: RetryPolicy) -> Self {
        Self {
            retry,
            generation_timeout: config.generation_timeout(),
            policy: config.ungrounded_policy,
            as_of: config.as_of,
        }
    }

    /// Set the ungrounded-marker policy
    pub fn with_policy(mut self, policy: UngroundedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the per-attempt generation deadline
    pub fn with_timeout(mut self, generation_timeout: Duration) -> Self {
        self.generation_timeout = generation_timeout;
        self
    }

    /// Disclaimer appended to every answer
    ///
    /// The currency date is only stated when one is configured.
    pub fn disclaimer(&self) -> String {
        let base = "Disclaimer: for educational use only, not a substitute for professional medical advice.";
        match self.as_of {
            Some(date) => format!(
                "{} Reference material is current as of {}.",
                base,
                date.format("%Y-%m-%d")
            ),
            None => base.to_string(),
        }
    }

    /// Generate an answer to `question` grounded in `retrieval`
    ///
    /// Fails with `GenerationUnavailable` when every attempt errors or times
    /// out; no partial answer is returned.
    pub async fn assemble(
        &self,
        question: &str,
        retrieval: &RetrievalResult,
        llm: &dyn LlmProvider,
    ) -> Result<CitedAnswer> {
        if retrieval.is_empty() {
            tracing::warn!("No sources retrieved; skipping generation");
            return Ok(CitedAnswer {
                question: question.to_string(),
                text: self.with_disclaimer(NO_SOURCES_ANSWER),
                citations: Vec::new(),
                warnings: Vec::new(),
            });
        }

        let prompt = PromptBuilder::build_prompt(question, retrieval);
        let prompt = prompt.as_str();
        let deadline = self.generation_timeout;

        let raw = self
            .retry
            .run("Answer generation", move || async move {
                match timeout(deadline, llm.generate(prompt)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(deadline)),
                }
            })
            .await
            .map_err(|e| {
                tracing::error!("Answer generation failed with {}: {}", llm.model(), e);
                Error::GenerationUnavailable(e.to_string())
            })?;

        let linked = link_citations(raw.trim(), retrieval, self.policy);
        tracing::info!(
            "Assembled answer with {} citations ({} ungrounded markers)",
            linked.citations.len(),
            linked.warnings.len()
        );

        Ok(CitedAnswer {
            question: question.to_string(),
            text: self.with_disclaimer(&linked.text),
            citations: linked.citations,
            warnings: linked.warnings,
        })
    }

    fn with_disclaimer(&self, text: &str) -> String {
        format!("{}\n\n{}", text, self.disclaimer())
    }
}
