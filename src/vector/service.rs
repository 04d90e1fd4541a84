//! Embed-and-index service for idea vectors.
//!
//! Lazily loads the persisted index on first use and coordinates the
//! embedding client, the cosine index, and vectors.bin. Thread-safe
//! through interior mutability.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ai::{AiError, ChatClient, EmbeddingClient, EMBEDDING_DIMENSIONS};
use crate::config::AiConfig;
use crate::eid::Eid;
use crate::ideas::Idea;
use crate::users::UserData;
use crate::vector::content::{compose_content, content_hash, SUMMARY_MAX_CHARS};
use crate::vector::index::{IndexError, SearchResult, VectorIndex};
use crate::vector::storage::{VectorStorage, VectorStorageError};

#[derive(Debug, thiserror::Error)]
pub enum VectorSearchError {
    #[error("Embedding error: {0}")]
    Ai(#[from] AiError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// What a vectorize pass did. Per-idea failures are logged and counted,
/// never fatal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorizeReport {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
}

struct VectorState {
    index: VectorIndex,
    storage: VectorStorage,
}

pub struct VectorSearchService {
    embedding: EmbeddingClient,
    chat: ChatClient,
    model_name: String,
    base_path: PathBuf,
    /// Lazily-initialized state. Uses Mutex<Option<_>> instead of OnceLock
    /// because get_or_try_init is unstable.
    state: Mutex<Option<VectorState>>,
}

impl VectorSearchService {
    pub fn new(config: &AiConfig, base_path: PathBuf) -> Self {
        Self {
            embedding: EmbeddingClient::new(config),
            chat: ChatClient::new(config),
            model_name: config.embedding_model.clone(),
            base_path,
            state: Mutex::new(None),
        }
    }

    fn model_id_hash(&self) -> [u8; 32] {
        Sha256::digest(self.model_name.as_bytes()).into()
    }

    /// Embed a search value. Used by the voice pipeline.
    pub fn embed_query(&self, value: &str) -> Result<Vec<f32>, VectorSearchError> {
        Ok(self.embedding.embed(value)?)
    }

    /// The vector_search_ideas operation: ids of ideas whose embeddings
    /// score at least `threshold` against the query, best first, at
    /// most `match_count` of them.
    pub fn search(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        match_count: usize,
    ) -> Result<Vec<SearchResult>, VectorSearchError> {
        self.ensure_initialized()?;

        let guard = self.lock_state()?;
        let state = guard.as_ref().ok_or_else(|| {
            VectorSearchError::Internal("state missing after init".to_string())
        })?;

        Ok(state.index.search(query_embedding, threshold, match_count)?)
    }

    /// Embed one idea into the index. Returns false when the content
    /// hash is unchanged and the entry was skipped.
    pub fn index_idea(
        &self,
        idea: &Idea,
        founder: Option<&UserData>,
    ) -> Result<bool, VectorSearchError> {
        self.ensure_initialized()?;

        let hash = content_hash(idea);

        {
            let guard = self.lock_state()?;
            let state = guard.as_ref().ok_or_else(|| {
                VectorSearchError::Internal("state missing after init".to_string())
            })?;
            if state
                .index
                .get(&idea.id)
                .map(|entry| entry.content_hash == hash)
                .unwrap_or(false)
            {
                return Ok(false);
            }
        }

        // Summarize outside the lock; the call can take seconds.
        let summary = if idea.description.trim().is_empty() {
            String::new()
        } else {
            self.chat.summarize(&idea.description, SUMMARY_MAX_CHARS)
        };

        let Some(content) = compose_content(idea, founder, &summary) else {
            let mut guard = self.lock_state()?;
            if let Some(state) = guard.as_mut() {
                state.index.remove(&idea.id);
            }
            return Ok(true);
        };

        log::debug!("vectorizing idea {}: {content}", idea.id);
        let embedding = self.embedding.embed(&content)?;

        let mut guard = self.lock_state()?;
        let state = guard.as_mut().ok_or_else(|| {
            VectorSearchError::Internal("state missing after init".to_string())
        })?;
        state.index.insert(idea.id.clone(), hash, embedding)?;

        Ok(true)
    }

    /// Re-embed a corpus. Best effort: failures are logged and counted.
    pub fn vectorize(
        &self,
        ideas: &[Idea],
        founder_of: impl Fn(&Eid) -> Option<UserData>,
    ) -> Result<VectorizeReport, VectorSearchError> {
        let mut report = VectorizeReport::default();

        for idea in ideas {
            let founder = founder_of(&idea.user_id);
            match self.index_idea(idea, founder.as_ref()) {
                Ok(true) => report.indexed += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    log::error!("failed to vectorize idea {}: {err}", idea.id);
                    report.failed += 1;
                }
            }
        }

        self.save_index()?;

        log::info!(
            "vectorize pass: {} indexed, {} skipped, {} failed",
            report.indexed,
            report.skipped,
            report.failed
        );

        Ok(report)
    }

    pub fn remove_idea(&self, id: &Eid) -> Result<(), VectorSearchError> {
        self.ensure_initialized()?;

        let mut guard = self.lock_state()?;
        if let Some(state) = guard.as_mut() {
            state.index.remove(id);
        }
        Ok(())
    }

    pub fn indexed_count(&self) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.index.len()))
            .unwrap_or(0)
    }

    pub fn save_index(&self) -> Result<(), VectorSearchError> {
        self.ensure_initialized()?;

        let guard = self.lock_state()?;
        let state = guard.as_ref().ok_or_else(|| {
            VectorSearchError::Internal("state missing after init".to_string())
        })?;

        state.storage.save(&state.index, &self.model_id_hash())?;

        Ok(())
    }

    fn lock_state(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<VectorState>>, VectorSearchError> {
        self.state
            .lock()
            .map_err(|e| VectorSearchError::Internal(format!("Lock poisoned: {}", e)))
    }

    fn ensure_initialized(&self) -> Result<(), VectorSearchError> {
        let mut guard = self.lock_state()?;

        if guard.is_none() {
            *guard = Some(self.do_init()?);
        }

        Ok(())
    }

    fn do_init(&self) -> Result<VectorState, VectorSearchError> {
        log::info!(
            "Initializing vector search with model '{}'",
            self.model_name
        );

        let model_id = self.model_id_hash();
        let vectors_path = self.base_path.join("vectors.bin");
        let storage = VectorStorage::new(vectors_path);

        let index = if storage.exists() {
            match storage.load(&model_id, EMBEDDING_DIMENSIONS) {
                Ok(idx) => {
                    log::info!("Loaded {} vectors from storage", idx.len());
                    idx
                }
                Err(VectorStorageError::ModelMismatch) => {
                    log::warn!("Embedding model changed, creating fresh index");
                    VectorIndex::new(EMBEDDING_DIMENSIONS)
                }
                Err(VectorStorageError::VersionMismatch(file_ver, _)) => {
                    log::warn!(
                        "Storage version {} unsupported, creating fresh index",
                        file_ver
                    );
                    VectorIndex::new(EMBEDDING_DIMENSIONS)
                }
                Err(e) => {
                    log::error!("Failed to load vectors: {}", e);
                    return Err(e.into());
                }
            }
        } else {
            log::info!("No existing index, starting fresh");
            VectorIndex::new(EMBEDDING_DIMENSIONS)
        };

        Ok(VectorState { index, storage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(dir: &std::path::Path) -> VectorSearchService {
        VectorSearchService::new(&AiConfig::default(), dir.to_path_buf())
    }

    #[test]
    fn test_uninitialized_count_is_zero() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service(tmp.path());
        assert_eq!(service.indexed_count(), 0);
    }

    #[test]
    fn test_init_with_no_storage_starts_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service(tmp.path());

        service.ensure_initialized().unwrap();
        assert_eq!(service.indexed_count(), 0);

        service.save_index().unwrap();
        assert!(tmp.path().join("vectors.bin").exists());
    }

    #[test]
    fn test_foreign_model_storage_starts_fresh() {
        let tmp = tempfile::tempdir().unwrap();

        // write a vectors.bin under a different model id
        let storage = VectorStorage::new(tmp.path().join("vectors.bin"));
        let mut index = VectorIndex::new(EMBEDDING_DIMENSIONS);
        index
            .insert("idea-x".into(), 1, vec![1.0; EMBEDDING_DIMENSIONS])
            .unwrap();
        let foreign_id: [u8; 32] = Sha256::digest(b"some-other-model").into();
        storage.save(&index, &foreign_id).unwrap();

        let service = service(tmp.path());
        service.ensure_initialized().unwrap();
        assert_eq!(service.indexed_count(), 0);
    }

    // Embedding calls require a live API key
    #[test]
    #[ignore = "requires live AI API"]
    fn test_index_and_search_integration() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service(tmp.path());

        let idea = Idea {
            id: Eid::new(),
            title: "AI bookkeeping".to_string(),
            description: "Automated accounting with language models".to_string(),
            industry: "ai".to_string(),
            ..Default::default()
        };

        service.index_idea(&idea, None).unwrap();
        let query = service.embed_query("ai accounting tools").unwrap();
        let results = service.search(&query, 0.32, 10).unwrap();
        assert!(!results.is_empty());
    }
}
