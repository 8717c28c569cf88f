//! Durable, single-flight embedding cache keyed by content fingerprint
//!
//! Embeddings are expensive to compute and deterministic per model, so each
//! distinct chunk content is embedded at most once. Concurrent misses for the
//! same fingerprint wait on a per-fingerprint claim instead of calling the
//! embedder twice; misses for different fingerprints run independently.

use dashmap::DashMap;
use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::retrieval::index::ensure_finite;
use crate::types::Chunk;

use super::fingerprint::Fingerprint;

/// On-disk layout of the cache
#[derive(Serialize, Deserialize)]
struct CacheFile {
    model: String,
    entries: HashMap<Fingerprint, Vec<f32>>,
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    model: &'a str,
    entries: &'a HashMap<Fingerprint, Vec<f32>>,
}

/// Embedding cache
pub struct EmbeddingCache {
    /// Model the cached vectors belong to
    model: String,
    /// Backing file, if persistent
    path: Option<PathBuf>,
    /// Fingerprint -> embedding
    entries: RwLock<HashMap<Fingerprint, Vec<f32>>>,
    /// Claims for fingerprints currently being embedded
    in_flight: DashMap<Fingerprint, Arc<Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    /// Create an empty in-memory cache for `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            path: None,
            entries: RwLock::new(HashMap::new()),
            in_flight: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Open a persistent cache at `path`
    ///
    /// Entries written for another model are discarded, as are unreadable
    /// files; the cache is rebuilt from scratch in both cases.
    pub fn open(path: impl Into<PathBuf>, model: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let mut cache = Self::new(model);

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<CacheFile>(&content) {
                Ok(file) if file.model == cache.model => {
                    tracing::info!(
                        "Loaded {} cached embeddings from {}",
                        file.entries.len(),
                        path.display()
                    );
                    *cache.entries.get_mut() = file.entries;
                }
                Ok(file) => {
                    tracing::warn!(
                        "Embedding cache {} was built with model '{}', current model is '{}'; ignoring it",
                        path.display(),
                        file.model,
                        cache.model
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Embedding cache {} is unreadable ({}); starting empty",
                        path.display(),
                        e
                    );
                }
            }
        }

        cache.path = Some(path);
        Ok(cache)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Cached embedding for `fingerprint`, without touching the statistics
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Vec<f32>> {
        self.entries.read().get(fingerprint).cloned()
    }

    /// Embedding of a chunk's content, computed on a miss
    pub async fn get_or_compute(
        &self,
        chunk: &Chunk,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Vec<f32>> {
        self.get_or_compute_text(&chunk.content, embedder).await
    }

    /// Embedding of `text`, computed on a miss
    pub async fn get_or_compute_text(
        &self,
        text: &str,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Vec<f32>> {
        let fingerprint = Fingerprint::of(text);

        if let Some(vector) = self.get(&fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Embedding cache hit for {}", fingerprint.short());
            return Ok(vector);
        }

        let claim = self
            .in_flight
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = claim.lock().await;
            self.compute_claimed(&fingerprint, text, embedder).await
        };

        // The claim stays registered while any other caller still holds it,
        // so a caller arriving after a failed attempt queues behind the retry
        self.in_flight.remove_if(&fingerprint, |_, current| {
            Arc::ptr_eq(current, &claim) && Arc::strong_count(current) == 2
        });
        result
    }

    /// Miss path, run while holding the fingerprint's claim
    async fn compute_claimed(
        &self,
        fingerprint: &Fingerprint,
        text: &str,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Vec<f32>> {
        // Another caller may have filled the entry while we waited
        if let Some(vector) = self.get(fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Embedding cache hit for {} after wait", fingerprint.short());
            return Ok(vector);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let vector = embedder.embed(text).await?;
        self.insert(fingerprint.clone(), vector.clone())?;
        Ok(vector)
    }

    /// Embed `chunks` through the cache with at most `concurrency` embedder
    /// calls in flight. Vectors are returned in chunk order.
    pub async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        embedder: &dyn EmbeddingProvider,
        concurrency: usize,
    ) -> Result<Vec<Vec<f32>>> {
        stream::iter(chunks)
            .map(|chunk| self.get_or_compute(chunk, embedder))
            .buffered(concurrency.max(1))
            .try_collect()
            .await
    }

    fn insert(&self, fingerprint: Fingerprint, vector: Vec<f32>) -> Result<()> {
        ensure_finite(&vector)?;
        let mut entries = self.entries.write();
        if let Some(expected) = entries.values().next().map(Vec::len) {
            if expected != vector.len() {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }
        entries.insert(fingerprint, vector);
        Ok(())
    }

    /// Write the cache to its backing file. No-op for in-memory caches.
    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.save_to(path),
            None => Ok(()),
        }
    }

    /// Write the cache to `path` atomically
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let entries = self.entries.read();
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(
            &mut tmp,
            &CacheFileRef {
                model: &self.model,
                entries: &entries,
            },
        )?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::info!("Saved {} embeddings to {}", entries.len(), path.display());
        Ok(())
    }

    /// Drop every entry, in memory and on disk
    pub fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);

        if let Some(path) = &self.path {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        tracing::info!("Embedding cache cleared");
        Ok(())
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
