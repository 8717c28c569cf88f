//! Configuration for the RAG pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::generation::UngroundedPolicy;
use crate::types::TrustTier;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Answer assembly configuration
    pub answer: AnswerConfig,
    /// Pipeline paths and limits
    pub pipeline: PipelineConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file. Missing sections use defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: RagConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_tokens == 0 {
            return Err(Error::Config("chunking.max_tokens must be at least 1".into()));
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens {
            return Err(Error::Config(format!(
                "chunking.overlap_tokens ({}) must be smaller than chunking.max_tokens ({})",
                self.chunking.overlap_tokens, self.chunking.max_tokens
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be at least 1".into()));
        }
        if self.pipeline.concurrency == 0 {
            return Err(Error::Config("pipeline.concurrency must be at least 1".into()));
        }
        if self.embeddings.provider == EmbeddingBackend::Hashing && self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be at least 1".into()));
        }
        Ok(())
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum tokens per chunk
    pub max_tokens: usize,
    /// Tokens shared between consecutive chunks
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            overlap_tokens: 32,
        }
    }
}

/// Which embedding capability to use
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Ollama embeddings endpoint
    #[default]
    Ollama,
    /// Offline feature-hashing embedder
    Hashing,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend to use
    pub provider: EmbeddingBackend,
    /// Model name; the embedding cache is keyed by it
    pub model: String,
    /// Dimensions for the hashing embedder. Remote models report their own.
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Ollama,
            model: "all-minilm".to_string(),
            dimensions: 384,
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
    /// First backoff delay in milliseconds, doubled per attempt
    pub retry_base_ms: u64,
    /// Pull missing models on startup
    pub pull_missing_models: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            generate_model: "mistral:instruct".to_string(),
            temperature: 0.2,
            timeout_secs: 120,
            max_retries: 3,
            retry_base_ms: 500,
            pull_missing_models: true,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 7 }
    }
}

/// Answer assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    /// Date the reference material is current as of, stated in the
    /// disclaimer when set
    pub as_of: Option<NaiveDate>,
    /// What to do with markers that cite non-retrieved sources
    pub ungrounded_policy: UngroundedPolicy,
    /// Deadline for a single generation attempt, in seconds
    pub generation_timeout_secs: u64,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            as_of: None,
            ungrounded_policy: UngroundedPolicy::Drop,
            generation_timeout_secs: 120,
        }
    }
}

impl AnswerConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

/// Pipeline paths, stage flags and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory of raw input files
    pub input_dir: PathBuf,
    /// Directory holding persisted stage artifacts
    pub artifact_dir: PathBuf,
    /// Maximum embedder calls in flight
    pub concurrency: usize,
    /// Overall deadline for answering one question, in seconds
    pub question_timeout_secs: u64,
    /// Trust tier for documents outside a tier directory
    pub default_trust_tier: TrustTier,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("medrag");

        Self {
            input_dir: PathBuf::from("data"),
            artifact_dir: base.join("artifacts"),
            concurrency: num_cpus::get().min(8),
            question_timeout_secs: 300,
            default_trust_tier: TrustTier::default(),
        }
    }
}

impl PipelineConfig {
    pub fn question_timeout(&self) -> Duration {
        Duration::from_secs(self.question_timeout_secs)
    }
}
