//! Stage orchestration: clean -> chunk -> embed -> index

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::{PipelineConfig, RagConfig};
use crate::embeddings::{CacheStats, EmbeddingCache};
use crate::error::{Error, Result};
use crate::ingestion::{DocumentCleaner, TextChunker};
use crate::providers::EmbeddingProvider;
use crate::retrieval::{chunk_set_fingerprint, IndexEntry, VectorIndex};
use crate::types::{Chunk, Document, DocumentMeta};

use super::artifacts::ArtifactStore;
use super::Stage;

/// Statistics of one pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Whether the clean stage ran
    pub cleaned: bool,
    /// Whether the vectorize stage ran
    pub vectorized: bool,
    /// Documents cleaned or loaded, when documents were needed
    pub documents: Option<usize>,
    /// Entries in the resulting index
    pub indexed_chunks: usize,
    /// Embedding cache usage, when vectorizing
    pub cache: Option<CacheStats>,
    pub elapsed: Duration,
}

/// What a run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Built or loaded index, shared with query engines
    pub index: Arc<VectorIndex>,
    pub stats: RunStats,
}

/// Runs the offline stages
pub struct Pipeline {
    config: PipelineConfig,
    chunker: TextChunker,
    cleaner: Arc<dyn DocumentCleaner>,
    embedder: Arc<dyn EmbeddingProvider>,
    artifacts: ArtifactStore,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        cleaner: Arc<dyn DocumentCleaner>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let artifacts = ArtifactStore::new(&config.artifact_dir);
        Self {
            config,
            chunker: TextChunker::default(),
            cleaner,
            embedder,
            artifacts,
        }
    }

    /// Pipeline with chunking and paths taken from `config`
    pub fn from_config(
        config: &RagConfig,
        cleaner: Arc<dyn DocumentCleaner>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self::new(config.pipeline.clone(), cleaner, embedder)
            .with_chunker(TextChunker::from_config(&config.chunking))
    }

    pub fn with_chunker(mut self, chunker: TextChunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Run the enabled stages
    ///
    /// A disabled stage reuses its persisted artifact and fails with
    /// `MissingArtifact` when there is none. Loading an index while freshly
    /// cleaned documents chunk differently fails with `StaleArtifact`.
    pub async fn run(&self, clean_data: bool, vectorize_data: bool) -> Result<PipelineOutput> {
        let started = Instant::now();
        let mut stats = RunStats {
            cleaned: clean_data,
            vectorized: vectorize_data,
            ..RunStats::default()
        };

        let cleaned = if clean_data {
            let documents = self.clean().await.map_err(|e| {
                tracing::error!("Stage '{}' failed: {}", Stage::Clean, e);
                e
            })?;
            Some(documents)
        } else {
            tracing::info!("Skipping stage '{}'", Stage::Clean);
            None
        };

        let index = if vectorize_data {
            let documents = match cleaned {
                Some(documents) => documents,
                None => self.artifacts.load_documents()?,
            };
            stats.documents = Some(documents.len());

            let (index, cache_stats) = self.vectorize(&documents).await.map_err(|e| {
                tracing::error!("Stage '{}' failed: {}", Stage::Vectorize, e);
                e
            })?;
            stats.cache = Some(cache_stats);
            index
        } else {
            tracing::info!("Skipping stage '{}'; loading persisted index", Stage::Vectorize);
            let index = self.load_index()?;

            if let Some(documents) = &cleaned {
                stats.documents = Some(documents.len());
                let chunks = self.chunker.chunk_all(documents);
                let expected = chunk_set_fingerprint(&chunks.iter().collect::<Vec<_>>());
                if &expected != index.chunk_set_fingerprint() {
                    tracing::error!(
                        "Persisted index does not match the cleaned documents; re-run with vectorize enabled"
                    );
                    return Err(Error::StaleArtifact {
                        stage: Stage::Vectorize,
                    });
                }
            }
            index
        };

        stats.indexed_chunks = index.len();
        stats.elapsed = started.elapsed();
        tracing::info!(
            "Pipeline ready: {} chunks indexed in {:.2?}",
            stats.indexed_chunks,
            stats.elapsed
        );

        Ok(PipelineOutput {
            index: Arc::new(index),
            stats,
        })
    }

    /// Load the persisted index and check it against the configured
    /// embedder and the persisted chunks
    fn load_index(&self) -> Result<VectorIndex> {
        let index = self.artifacts.load_index()?;

        let model = self.embedder.model();
        if index.embedding_model() != model {
            tracing::error!(
                "Persisted index was embedded with '{}' but the embedder is '{}'; re-run with vectorize enabled",
                index.embedding_model(),
                model
            );
            return Err(Error::StaleArtifact {
                stage: Stage::Vectorize,
            });
        }
        if let Some(dims) = self.embedder.dimensions() {
            if !index.is_empty() && dims != index.dimensions() {
                tracing::error!(
                    "Persisted index has {} dimensions but the embedder produces {}",
                    index.dimensions(),
                    dims
                );
                return Err(Error::StaleArtifact {
                    stage: Stage::Vectorize,
                });
            }
        }

        let chunks = self.artifacts.load_chunks()?;
        let persisted = chunk_set_fingerprint(&chunks.iter().collect::<Vec<_>>());
        if &persisted != index.chunk_set_fingerprint() {
            tracing::error!("Persisted index does not match the persisted chunks");
            return Err(Error::StaleArtifact {
                stage: Stage::Vectorize,
            });
        }

        Ok(index)
    }

    async fn clean(&self) -> Result<Vec<Document>> {
        tracing::info!(
            "Stage '{}': {} cleaner on {}",
            Stage::Clean,
            self.cleaner.name(),
            self.config.input_dir.display()
        );

        let cleaner = Arc::clone(&self.cleaner);
        let input_dir = self.config.input_dir.clone();
        let documents = tokio::task::spawn_blocking(move || cleaner.clean(&input_dir))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        self.artifacts.save_documents(&documents)?;
        tracing::info!("Stage '{}' done: {} documents", Stage::Clean, documents.len());
        Ok(documents)
    }

    async fn vectorize(&self, documents: &[Document]) -> Result<(VectorIndex, CacheStats)> {
        tracing::info!("Stage '{}': {} documents", Stage::Vectorize, documents.len());

        let chunks = self.chunker.chunk_all(documents);
        self.artifacts.save_chunks(&chunks)?;
        if chunks.is_empty() {
            tracing::warn!("No chunks produced; the index will be empty");
        }

        let model = self.embedder.model();
        let cache = EmbeddingCache::open(self.artifacts.embedding_cache_path(), model)?;
        let embedded = cache
            .embed_chunks(&chunks, self.embedder.as_ref(), self.config.concurrency)
            .await;
        // Keep whatever was embedded before a failure
        cache.save()?;
        let embeddings = embedded?;

        let index = VectorIndex::build(index_entries(documents, chunks, embeddings)?)?
            .with_embedding_model(model);
        self.artifacts.save_index(&index)?;

        let cache_stats = cache.stats();
        tracing::info!(
            "Stage '{}' done: {} chunks, {} cache hits, {} misses",
            Stage::Vectorize,
            index.len(),
            cache_stats.hits,
            cache_stats.misses
        );
        Ok((index, cache_stats))
    }
}

fn index_entries(
    documents: &[Document],
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
) -> Result<Vec<IndexEntry>> {
    let metas: HashMap<Uuid, DocumentMeta> = documents.iter().map(|d| (d.id, d.meta())).collect();

    chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| {
            let document = metas
                .get(&chunk.document_id)
                .cloned()
                .ok_or_else(|| Error::internal(format!("chunk {} has no document", chunk.id)))?;
            Ok(IndexEntry::new(chunk, embedding, document))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::PlainTextCleaner;
    use crate::providers::HashingEmbedder;
    use async_trait::async_trait;
    use std::fs;
    use std::path::Path;

    fn write_corpus(dir: &Path) {
        let guidelines = dir.join("guidelines");
        fs::create_dir_all(&guidelines).unwrap();
        fs::write(
            guidelines.join("hypertension.txt"),
            "Hypertension is blood pressure above 130/80 mmHg. First line therapy includes \
             thiazide diuretics and ACE inhibitors. Lifestyle change is recommended for all patients.",
        )
        .unwrap();
        fs::write(
            dir.join("anatomy.md"),
            "The femur is the longest bone in the human body. It articulates with the hip and knee.",
        )
        .unwrap();
    }

    fn pipeline(root: &Path) -> Pipeline {
        pipeline_with(root, Arc::new(HashingEmbedder::new(64).unwrap()))
    }

    fn pipeline_with(root: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Pipeline {
        let config = PipelineConfig {
            input_dir: root.join("data"),
            artifact_dir: root.join("artifacts"),
            concurrency: 2,
            ..PipelineConfig::default()
        };
        Pipeline::new(
            config,
            Arc::new(PlainTextCleaner::default()),
            embedder,
        )
        .with_chunker(TextChunker::new(12, 3))
    }

    /// Same vectors as the 64-dim hashing embedder under another model name
    struct RenamedEmbedder {
        inner: HashingEmbedder,
        model: &'static str,
    }

    #[async_trait]
    impl EmbeddingProvider for RenamedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.inner.embed(text).await
        }

        fn dimensions(&self) -> Option<usize> {
            self.inner.dimensions()
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "renamed"
        }

        fn model(&self) -> &str {
            self.model
        }
    }

    #[tokio::test]
    async fn test_full_run_writes_artifacts() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(&root.path().join("data"));
        let pipeline = pipeline(root.path());

        let output = pipeline.run(true, true).await.unwrap();

        assert_eq!(output.stats.documents, Some(2));
        assert!(output.stats.indexed_chunks > 2);
        assert_eq!(output.stats.cache.unwrap().misses as usize, output.stats.indexed_chunks);

        let artifacts = pipeline.artifacts();
        assert!(artifacts.documents_path().exists());
        assert!(artifacts.chunks_path().exists());
        assert!(artifacts.embedding_cache_path().exists());
        assert!(artifacts.index_path().exists());
    }

    #[tokio::test]
    async fn test_second_vectorize_hits_cache() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(&root.path().join("data"));
        let pipeline = pipeline(root.path());

        pipeline.run(true, true).await.unwrap();
        let output = pipeline.run(false, true).await.unwrap();

        let cache = output.stats.cache.unwrap();
        assert_eq!(cache.misses, 0);
        assert_eq!(cache.hits as usize, output.stats.indexed_chunks);
    }

    #[tokio::test]
    async fn test_skipping_both_stages_loads_index() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(&root.path().join("data"));
        let pipeline = pipeline(root.path());

        let built = pipeline.run(true, true).await.unwrap();
        let loaded = pipeline.run(false, false).await.unwrap();

        assert_eq!(loaded.index.len(), built.index.len());
        assert!(loaded.stats.cache.is_none());
    }

    #[tokio::test]
    async fn test_missing_clean_artifact() {
        let root = tempfile::tempdir().unwrap();
        let err = pipeline(root.path()).run(false, true).await.unwrap_err();
        assert!(matches!(err, Error::MissingArtifact { stage: Stage::Clean }));
    }

    #[tokio::test]
    async fn test_missing_vectorize_artifact() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(&root.path().join("data"));
        let err = pipeline(root.path()).run(true, false).await.unwrap_err();
        assert!(matches!(err, Error::MissingArtifact { stage: Stage::Vectorize }));
    }

    #[tokio::test]
    async fn test_stale_index_detected() {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("data");
        write_corpus(&data);
        let pipeline = pipeline(root.path());
        pipeline.run(true, true).await.unwrap();

        fs::write(data.join("anatomy.md"), "The heart has four chambers and two valves.").unwrap();

        let err = pipeline.run(true, false).await.unwrap_err();
        assert!(matches!(err, Error::StaleArtifact { stage: Stage::Vectorize }));
    }

    #[tokio::test]
    async fn test_unchanged_documents_reuse_index() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(&root.path().join("data"));
        let pipeline = pipeline(root.path());
        pipeline.run(true, true).await.unwrap();

        let output = pipeline.run(true, false).await.unwrap();
        assert_eq!(output.stats.documents, Some(2));
    }

    #[tokio::test]
    async fn test_missing_input_dir_fails_clean() {
        let root = tempfile::tempdir().unwrap();
        let err = pipeline(root.path()).run(true, true).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_index_from_other_embedding_model_is_stale() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(&root.path().join("data"));
        pipeline(root.path()).run(true, true).await.unwrap();

        let other = pipeline_with(
            root.path(),
            Arc::new(RenamedEmbedder {
                inner: HashingEmbedder::new(64).unwrap(),
                model: "other-model",
            }),
        );

        let err = other.run(true, false).await.unwrap_err();
        assert!(matches!(err, Error::StaleArtifact { stage: Stage::Vectorize }));
        let err = other.run(false, false).await.unwrap_err();
        assert!(matches!(err, Error::StaleArtifact { stage: Stage::Vectorize }));

        // rebuilding with the new model makes the index usable again
        other.run(false, true).await.unwrap();
        let output = other.run(false, false).await.unwrap();
        assert_eq!(output.index.embedding_model(), "other-model");
    }

    #[tokio::test]
    async fn test_index_with_other_dimensions_is_stale() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(&root.path().join("data"));
        // 32-dim vectors recorded under the 64-dim model name
        let narrow = pipeline_with(
            root.path(),
            Arc::new(RenamedEmbedder {
                inner: HashingEmbedder::new(32).unwrap(),
                model: "hashing-64",
            }),
        );
        narrow.run(true, true).await.unwrap();

        let err = pipeline(root.path()).run(false, false).await.unwrap_err();
        assert!(matches!(err, Error::StaleArtifact { stage: Stage::Vectorize }));
    }

    #[tokio::test]
    async fn test_missing_chunks_artifact() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(&root.path().join("data"));
        let pipeline = pipeline(root.path());
        pipeline.run(true, true).await.unwrap();

        fs::remove_file(pipeline.artifacts().chunks_path()).unwrap();

        let err = pipeline.run(false, false).await.unwrap_err();
        assert!(matches!(err, Error::MissingArtifact { stage: Stage::Vectorize }));
    }

    #[tokio::test]
    async fn test_chunks_rewritten_after_index_is_stale() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(&root.path().join("data"));
        let pipeline = pipeline(root.path());
        pipeline.run(true, true).await.unwrap();

        let mut chunks = pipeline.artifacts().load_chunks().unwrap();
        chunks.pop();
        pipeline.artifacts().save_chunks(&chunks).unwrap();

        let err = pipeline.run(false, false).await.unwrap_err();
        assert!(matches!(err, Error::StaleArtifact { stage: Stage::Vectorize }));
    }
}
