//! Answering questions against a built pipeline

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::generation::AnswerAssembler;
use crate::providers::{EmbeddingProvider, LlmProvider, RetryPolicy};
use crate::retrieval::Retriever;
use crate::types::{CitedAnswer, RetrievalResult};

use super::orchestrator::PipelineOutput;

/// Retrieved sources together with the answer built from them
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub sources: RetrievalResult,
    pub answer: CitedAnswer,
}

/// Answers questions: retrieve top-K, then assemble a cited answer
#[derive(Clone)]
pub struct QueryEngine {
    retriever: Retriever,
    assembler: AnswerAssembler,
    llm: Arc<dyn LlmProvider>,
    top_k: usize,
    question_timeout: Duration,
}

impl QueryEngine {
    pub fn new(
        retriever: Retriever,
        assembler: AnswerAssembler,
        llm: Arc<dyn LlmProvider>,
        top_k: usize,
        question_timeout: Duration,
    ) -> Self {
        Self {
            retriever,
            assembler,
            llm,
            top_k,
            question_timeout,
        }
    }

    /// Engine over `output`, configured from `config`
    pub fn from_config(
        config: &RagConfig,
        output: &PipelineOutput,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        let retriever = Retriever::new(embedder, Arc::clone(&output.index));
        let assembler = AnswerAssembler::new(&config.answer, RetryPolicy::from_config(&config.llm));
        Self::new(
            retriever,
            assembler,
            llm,
            config.retrieval.top_k,
            config.pipeline.question_timeout(),
        )
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer `question` with citations
    pub async fn answer(&self, question: &str) -> Result<CitedAnswer> {
        Ok(self.ask(question).await?.answer)
    }

    /// Answer `question`, also returning the retrieved sources
    ///
    /// The whole question, retrieval included, runs under the configured
    /// question timeout. Running out of time during retrieval fails with
    /// `Timeout`; running out while the answer is generated fails with
    /// `GenerationUnavailable`, like any other generation failure.
    pub async fn ask(&self, question: &str) -> Result<QueryResponse> {
        let deadline = Instant::now() + self.question_timeout;
        tracing::info!("Answering question: {}", question.trim());

        let retrieval = self.retriever.retrieve(question, self.top_k);
        let sources = match timeout_at(deadline, retrieval).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!("Retrieval timed out after {:?}", self.question_timeout);
                return Err(Error::Timeout(self.question_timeout));
            }
        };

        let assembly = self
            .assembler
            .assemble(question, &sources, self.llm.as_ref());
        let answer = match timeout_at(deadline, assembly).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    "Answer generation cut off by the {:?} question timeout",
                    self.question_timeout
                );
                return Err(Error::GenerationUnavailable(format!(
                    "question timed out after {:?}",
                    self.question_timeout
                )));
            }
        };

        Ok(QueryResponse { sources, answer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnswerConfig;
    use crate::providers::HashingEmbedder;
    use crate::retrieval::{IndexEntry, VectorIndex};
    use crate::types::{Chunk, Document, TrustTier};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    struct FixedLlm {
        reply: String,
        delay: Duration,
    }

    #[async_trait]
    impl LlmProvider for FixedLlm {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            Ok(self.reply.clone())
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed-v1"
        }
    }

    fn engine(reply: &str, delay: Duration, question_timeout: Duration) -> QueryEngine {
        let embedder = Arc::new(HashingEmbedder::new(128).unwrap());
        let entries = [
            ("Hypertension Guideline", "Blood pressure above 130/80 defines hypertension."),
            ("Anatomy", "The femur is the longest bone."),
        ]
        .iter()
        .map(|(title, text)| {
            let doc = Document::new(
                *title,
                format!("{}.txt", title),
                NaiveDate::from_ymd_opt(2023, 9, 1).unwrap(),
                *text,
                TrustTier::Guideline,
            );
            let chunk = Chunk::new(doc.id, 0, text.to_string(), 0..text.chars().count(), 0..1);
            IndexEntry::new(chunk, embedder.embed_text(text), doc.meta())
        })
        .collect();
        let index = Arc::new(VectorIndex::build(entries).unwrap());

        QueryEngine::new(
            Retriever::new(embedder, index),
            AnswerAssembler::new(&AnswerConfig::default(), RetryPolicy::none()),
            Arc::new(FixedLlm {
                reply: reply.to_string(),
                delay,
            }),
            2,
            question_timeout,
        )
    }

    #[tokio::test]
    async fn test_answer_cites_top_source() {
        let engine = engine("Above 130/80 [1].", Duration::ZERO, Duration::from_secs(5));
        let response = engine.ask("What blood pressure defines hypertension?").await.unwrap();

        assert_eq!(response.sources.len(), 2);
        assert_eq!(response.answer.citations.len(), 1);
        assert_eq!(response.answer.citations[0].title, "Hypertension Guideline");
        assert_eq!(response.answer.references(), vec!["Hypertension Guideline"]);
    }

    #[tokio::test]
    async fn test_question_timeout_during_generation() {
        let engine = engine("late", Duration::from_millis(300), Duration::from_millis(20));
        let err = engine.answer("hypertension?").await.unwrap_err();
        assert!(matches!(err, Error::GenerationUnavailable(_)));
    }

    /// Embedder that stalls before delegating to the hashing embedder
    struct SlowEmbedder {
        inner: HashingEmbedder,
        delay: Duration,
    }

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(self.delay).await;
            self.inner.embed(text).await
        }

        fn dimensions(&self) -> Option<usize> {
            self.inner.dimensions()
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "slow"
        }

        fn model(&self) -> &str {
            self.inner.model()
        }
    }

    #[tokio::test]
    async fn test_question_timeout_during_retrieval() {
        let base = engine("fast", Duration::ZERO, Duration::from_millis(20));
        let slow = Arc::new(SlowEmbedder {
            inner: HashingEmbedder::new(128).unwrap(),
            delay: Duration::from_millis(300),
        });
        let engine = QueryEngine::new(
            Retriever::new(slow, Arc::clone(base.retriever.index())),
            base.assembler.clone(),
            Arc::clone(&base.llm),
            2,
            Duration::from_millis(20),
        );

        let err = engine.answer("hypertension?").await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_default_timeouts_report_stalled_generator_as_unavailable() {
        // generation budget with retries outlasts the question timeout
        let config = RagConfig::default();
        let engine = engine("never", Duration::from_secs(3600), config.pipeline.question_timeout());
        let engine = QueryEngine {
            assembler: AnswerAssembler::new(&config.answer, RetryPolicy::from_config(&config.llm)),
            ..engine
        };

        tokio::time::pause();
        let err = engine.answer("hypertension?").await.unwrap_err();
        assert!(matches!(err, Error::GenerationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_top_k_override() {
        let engine = engine("x", Duration::ZERO, Duration::from_secs(5)).with_top_k(1);
        let response = engine.ask("femur").await.unwrap();
        assert_eq!(response.sources.len(), 1);
        assert_eq!(engine.top_k(), 1);
    }
}
