//! In-memory vector index with exact cosine top-K search

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::embeddings::fingerprint::{self, Fingerprint};
use crate::error::{Error, Result};
use crate::pipeline::Stage;
use crate::types::{Chunk, DocumentMeta, RetrievalResult, ScoredChunk};

/// Version of the persisted index layout
pub const INDEX_FORMAT_VERSION: u32 = 2;

/// A chunk, its embedding and the metadata of its document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub document: DocumentMeta,
}

impl IndexEntry {
    pub fn new(chunk: Chunk, embedding: Vec<f32>, document: DocumentMeta) -> Self {
        Self {
            chunk,
            embedding,
            document,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    #[serde(default)]
    embedding_model: String,
    dimensions: usize,
    chunk_set_fingerprint: Fingerprint,
    entries: Vec<IndexEntry>,
}

/// Immutable vector index. Rebuilt in full when the chunk set changes.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    /// Entries in insertion order, embeddings L2-normalized
    entries: Vec<IndexEntry>,
    dimensions: usize,
    chunk_set: Fingerprint,
    /// Model that produced the embeddings; queries must use the same one
    embedding_model: String,
}

impl VectorIndex {
    /// Index with no entries; every query fails with `EmptyIndex`
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            dimensions: 0,
            chunk_set: chunk_set_fingerprint(&[]),
            embedding_model: String::new(),
        }
    }

    /// Build an index. All embeddings must share one dimension.
    pub fn build(mut entries: Vec<IndexEntry>) -> Result<Self> {
        let dimensions = entries.first().map_or(0, |e| e.embedding.len());

        if !entries.is_empty() && dimensions == 0 {
            return Err(Error::InvalidArgument("embeddings must not be empty".into()));
        }

        for entry in &mut entries {
            if entry.embedding.len() != dimensions {
                return Err(Error::DimensionMismatch {
                    expected: dimensions,
                    actual: entry.embedding.len(),
                });
            }
            ensure_finite(&entry.embedding)?;
            normalize(&mut entry.embedding);
        }

        let chunks: Vec<&Chunk> = entries.iter().map(|e| &e.chunk).collect();
        let chunk_set = chunk_set_fingerprint(&chunks);

        tracing::info!(
            "Built vector index with {} entries ({} dimensions)",
            entries.len(),
            dimensions
        );

        Ok(Self {
            entries,
            dimensions,
            chunk_set,
            embedding_model: String::new(),
        })
    }

    /// Record the embedding model the entries were produced with
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// The `k` entries most similar to `query`, best first
    ///
    /// Returns every entry when the index holds fewer than `k`. Equal scores
    /// keep insertion order.
    pub fn query(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be at least 1".into()));
        }
        if self.entries.is_empty() {
            return Err(Error::EmptyIndex);
        }
        if query.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        ensure_finite(query)?;

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, dot(&query, &entry.embedding)))
            .collect();
        // Stable sort: ties stay in insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        let hits = scored
            .into_iter()
            .map(|(i, score)| {
                let entry = &self.entries[i];
                ScoredChunk {
                    chunk: entry.chunk.clone(),
                    document: entry.document.clone(),
                    score,
                }
            })
            .collect();

        Ok(RetrievalResult::new(hits))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Fingerprint of the chunks this index was built from
    pub fn chunk_set_fingerprint(&self) -> &Fingerprint {
        &self.chunk_set
    }

    /// Persist the index atomically as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let file = IndexFile {
            version: INDEX_FORMAT_VERSION,
            embedding_model: self.embedding_model.clone(),
            dimensions: self.dimensions,
            chunk_set_fingerprint: self.chunk_set.clone(),
            entries: self.entries.clone(),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, &file)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::info!("Saved vector index to {}", path.display());
        Ok(())
    }

    /// Load an index written by [`VectorIndex::save`]
    ///
    /// A file from another format version, or whose entries no longer match
    /// its recorded chunk set, is reported as a stale vectorize artifact.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: IndexFile = serde_json::from_str(&content)?;

        if file.version != INDEX_FORMAT_VERSION {
            tracing::warn!(
                "Index {} has format version {}, expected {}",
                path.display(),
                file.version,
                INDEX_FORMAT_VERSION
            );
            return Err(Error::StaleArtifact {
                stage: Stage::Vectorize,
            });
        }

        let index = Self::build(file.entries)?.with_embedding_model(file.embedding_model);
        if index.chunk_set != file.chunk_set_fingerprint
            || (!index.is_empty() && index.dimensions != file.dimensions)
        {
            return Err(Error::StaleArtifact {
                stage: Stage::Vectorize,
            });
        }

        tracing::info!("Loaded vector index from {}", path.display());
        Ok(index)
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::empty()
    }
}

/// Fingerprint of an ordered chunk set: IDs and content both count
pub fn chunk_set_fingerprint(chunks: &[&Chunk]) -> Fingerprint {
    let keys: Vec<String> = chunks
        .iter()
        .map(|c| format!("{} {}", c.id, c.content))
        .collect();
    fingerprint::combined(keys.iter().map(String::as_str))
}

/// Reject vectors with NaN or infinite components
pub(crate) fn ensure_finite(v: &[f32]) -> Result<()> {
    match v.iter().position(|x| !x.is_finite()) {
        Some(i) => Err(Error::InvalidArgument(format!(
            "embedding component {} is not finite ({})",
            i, v[i]
        ))),
        None => Ok(()),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// L2-normalize in place. Zero vectors stay zero and score 0 against everything.
fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}
