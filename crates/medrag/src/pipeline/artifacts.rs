//! Persisted stage artifacts

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::embeddings::{fingerprint, Fingerprint};
use crate::error::{Error, Result};
use crate::retrieval::{chunk_set_fingerprint, VectorIndex};
use crate::types::{Chunk, Document};

use super::Stage;

pub const DOCUMENTS_FILE: &str = "cleaned_documents.json";
pub const CHUNKS_FILE: &str = "chunks.json";
pub const EMBEDDING_CACHE_FILE: &str = "embedding_cache.json";
pub const INDEX_FILE: &str = "index.json";

/// Version of the document and chunk artifact layout
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// On-disk layout of the document and chunk artifacts
#[derive(Serialize)]
struct ArtifactFileRef<'a, T> {
    version: u32,
    fingerprint: Fingerprint,
    items: &'a [T],
}

#[derive(Deserialize)]
struct ArtifactFile<T> {
    version: u32,
    fingerprint: Fingerprint,
    items: Vec<T>,
}

/// Directory holding the artifacts of every stage
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn documents_path(&self) -> PathBuf {
        self.dir.join(DOCUMENTS_FILE)
    }

    pub fn chunks_path(&self) -> PathBuf {
        self.dir.join(CHUNKS_FILE)
    }

    pub fn embedding_cache_path(&self) -> PathBuf {
        self.dir.join(EMBEDDING_CACHE_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn save_documents(&self, documents: &[Document]) -> Result<()> {
        self.write_artifact(&self.documents_path(), documents_fingerprint(documents), documents)
    }

    /// Documents from the last clean run
    pub fn load_documents(&self) -> Result<Vec<Document>> {
        self.read_artifact(&self.documents_path(), Stage::Clean, documents_fingerprint)
    }

    pub fn save_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        self.write_artifact(&self.chunks_path(), chunks_fingerprint(chunks), chunks)
    }

    /// Chunks the persisted index was built from
    pub fn load_chunks(&self) -> Result<Vec<Chunk>> {
        self.read_artifact(&self.chunks_path(), Stage::Vectorize, chunks_fingerprint)
    }

    pub fn save_index(&self, index: &VectorIndex) -> Result<()> {
        index.save(&self.index_path())
    }

    /// Index from the last vectorize run
    pub fn load_index(&self) -> Result<VectorIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Err(Error::MissingArtifact {
                stage: Stage::Vectorize,
            });
        }
        VectorIndex::load(&path)
    }

    fn write_artifact<T: Serialize>(
        &self,
        path: &Path,
        fingerprint: Fingerprint,
        items: &[T],
    ) -> Result<()> {
        let file = ArtifactFileRef {
            version: ARTIFACT_FORMAT_VERSION,
            fingerprint,
            items,
        };
        self.write_json(path, &file)
    }

    /// Read an artifact, checking its version and content fingerprint
    fn read_artifact<T: DeserializeOwned>(
        &self,
        path: &Path,
        stage: Stage,
        fingerprint_of: fn(&[T]) -> Fingerprint,
    ) -> Result<Vec<T>> {
        let file: ArtifactFile<T> = match self.read_json(path, stage) {
            Ok(file) => file,
            Err(Error::Json(e)) => {
                tracing::warn!("Unreadable artifact {}: {}", path.display(), e);
                return Err(Error::StaleArtifact { stage });
            }
            Err(e) => return Err(e),
        };

        if file.version != ARTIFACT_FORMAT_VERSION {
            tracing::warn!(
                "Artifact {} has format version {}, expected {}",
                path.display(),
                file.version,
                ARTIFACT_FORMAT_VERSION
            );
            return Err(Error::StaleArtifact { stage });
        }
        if fingerprint_of(&file.items) != file.fingerprint {
            tracing::warn!("Artifact {} does not match its fingerprint", path.display());
            return Err(Error::StaleArtifact { stage });
        }
        Ok(file.items)
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut tmp, value)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        tracing::debug!("Wrote {}", path.display());
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path, stage: Stage) -> Result<T> {
        if !path.exists() {
            return Err(Error::MissingArtifact { stage });
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn documents_fingerprint(documents: &[Document]) -> Fingerprint {
    let keys: Vec<String> = documents
        .iter()
        .map(|d| format!("{} {}", d.id, d.text))
        .collect();
    fingerprint::combined(keys.iter().map(String::as_str))
}

fn chunks_fingerprint(chunks: &[Chunk]) -> Fingerprint {
    chunk_set_fingerprint(&chunks.iter().collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrustTier;
    use chrono::NaiveDate;

    #[test]
    fn test_documents_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("artifacts"));
        let doc = Document::new(
            "Anatomy",
            "textbooks/anatomy.txt",
            NaiveDate::from_ymd_opt(2022, 11, 3).unwrap(),
            "The heart has four chambers.",
            TrustTier::Textbook,
        );

        store.save_documents(std::slice::from_ref(&doc)).unwrap();
        assert_eq!(store.load_documents().unwrap(), vec![doc]);
    }

    #[test]
    fn test_chunks_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let doc = Document::new(
            "Anatomy",
            "anatomy.txt",
            NaiveDate::from_ymd_opt(2022, 11, 3).unwrap(),
            "The heart has four chambers.",
            TrustTier::Textbook,
        );
        let chunk = Chunk::new(doc.id, 0, doc.text.clone(), 0..28, 0..5);

        store.save_chunks(std::slice::from_ref(&chunk)).unwrap();
        let loaded = store.load_chunks().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, chunk.id);
        assert_eq!(loaded[0].content, chunk.content);
    }

    #[test]
    fn test_edited_artifact_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let doc = Document::new(
            "Anatomy",
            "anatomy.txt",
            NaiveDate::from_ymd_opt(2022, 11, 3).unwrap(),
            "The heart has four chambers.",
            TrustTier::Textbook,
        );
        store.save_documents(&[doc]).unwrap();

        let path = store.documents_path();
        let edited = std::fs::read_to_string(&path)
            .unwrap()
            .replace("four chambers", "three chambers");
        std::fs::write(&path, edited).unwrap();

        assert!(matches!(
            store.load_documents(),
            Err(Error::StaleArtifact { stage: Stage::Clean })
        ));
    }

    #[test]
    fn test_unversioned_artifact_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        std::fs::write(store.chunks_path(), "[]").unwrap();
        std::fs::write(
            store.documents_path(),
            r#"{"version":0,"fingerprint":"00","items":[]}"#,
        )
        .unwrap();

        assert!(matches!(
            store.load_chunks(),
            Err(Error::StaleArtifact { stage: Stage::Vectorize })
        ));
        assert!(matches!(
            store.load_documents(),
            Err(Error::StaleArtifact { stage: Stage::Clean })
        ));
    }

    #[test]
    fn test_missing_artifacts_name_their_stage() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        assert!(matches!(
            store.load_documents(),
            Err(Error::MissingArtifact { stage: Stage::Clean })
        ));
        assert!(matches!(
            store.load_index(),
            Err(Error::MissingArtifact { stage: Stage::Vectorize })
        ));
        assert!(matches!(
            store.load_chunks(),
            Err(Error::MissingArtifact { stage: Stage::Vectorize })
        ));
    }
}
