//! Document store — one in-memory document, one writer at a time.
//!
//! Every mutation runs its read-modify-persist cycle under a single async
//! mutex. Persistence replaces the whole document. A failed persist keeps
//! the in-memory change and marks the store dirty; the next write or
//! `flush` retries.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::document::SharedDocument;
use super::StoreError;

/// Synchronous load/replace of the whole document.
pub trait DocumentBackend: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<SharedDocument>, StoreError>;
    fn save(&self, document: &SharedDocument) -> Result<(), StoreError>;
}

/// JSON file replaced atomically through a sibling temp file.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<SharedDocument>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let document = serde_json::from_str(&raw).map_err(|source| StoreError::Deserialization {
            path: self.path.display().to_string(),
            source,
        })?;
        Ok(Some(document))
    }

    fn save(&self, document: &SharedDocument) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_vec_pretty(document).map_err(StoreError::Serialization)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        std::io::Write::write_all(&mut tmp, &json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

/// Backend that keeps the last saved document in memory.
#[derive(Default)]
pub struct MemoryBackend {
    saved: std::sync::Mutex<Option<SharedDocument>>,
    fail_saves: AtomicBool,
    save_count: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: SharedDocument) -> Self {
        Self {
            saved: std::sync::Mutex::new(Some(document)),
            ..Self::default()
        }
    }

    /// Make subsequent saves fail, to exercise the retry path.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    pub fn saved_document(&self) -> Option<SharedDocument> {
        self.saved.lock().ok().and_then(|guard| guard.clone())
    }
}

impl DocumentBackend for MemoryBackend {
    fn load(&self) -> Result<Option<SharedDocument>, StoreError> {
        self.saved
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| StoreError::Unavailable("memory backend lock poisoned".into()))
    }

    fn save(&self, document: &SharedDocument) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("saves disabled".into()));
        }
        let mut guard = self
            .saved
            .lock()
            .map_err(|_| StoreError::Unavailable("memory backend lock poisoned".into()))?;
        *guard = Some(document.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Outcome of a mutation closure: whether the document must be persisted.
pub enum Change<T> {
    Modified(T),
    Unchanged(T),
}

struct StoreState {
    document: SharedDocument,
    dirty: bool,
}

/// The single shared document of a running engine.
pub struct DocumentStore {
    backend: Arc<dyn DocumentBackend>,
    state: Mutex<StoreState>,
}

impl DocumentStore {
    /// Load the document (or start empty) and normalise it.
    pub async fn open(backend: Arc<dyn DocumentBackend>) -> Result<Self, StoreError> {
        let loader = Arc::clone(&backend);
        let loaded = tokio::task::spawn_blocking(move || loader.load()).await??;
        let mut document = loaded.unwrap_or_default();
        let repaired = document.normalize();
        tracing::info!(
            medications = document.medications.len(),
            history = document.history.len(),
            "Document loaded"
        );
        let store = Self {
            backend,
            state: Mutex::new(StoreState {
                document,
                dirty: repaired,
            }),
        };
        if repaired {
            store.flush().await?;
        }
        Ok(store)
    }

    /// Copy of the current document for lock-free reads.
    pub async fn snapshot(&self) -> SharedDocument {
        self.state.lock().await.document.clone()
    }

    /// Run a read-only closure against the current document under the lock.
    pub async fn read<T>(&self, f: impl FnOnce(&SharedDocument) -> T) -> T {
        let state = self.state.lock().await;
        f(&state.document)
    }

    /// Read-modify-persist under the write lock. Persists when the closure
    /// reports a modification or an earlier persist is still pending.
    pub async fn mutate<T>(&self, f: impl FnOnce(&mut SharedDocument) -> Change<T>) -> T {
        let mut state = self.state.lock().await;
        let value = match f(&mut state.document) {
            Change::Modified(value) => {
                state.dirty = true;
                value
            }
            Change::Unchanged(value) => value,
        };
        if state.dirty {
            if let Err(e) = self.persist_locked(&mut state).await {
                tracing::warn!(error = %e, "Failed to persist document, will retry on next write");
            }
        }
        value
    }

    /// Persist if an earlier write failed.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.dirty {
            return Ok(());
        }
        self.persist_locked(&mut state).await
    }

    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }

    /// Replace the document with an empty one and persist it.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.document = SharedDocument::default();
        state.dirty = true;
        self.persist_locked(&mut state).await
    }

    async fn persist_locked(&self, state: &mut StoreState) -> Result<(), StoreError> {
        let document = state.document.clone();
        let backend = Arc::clone(&self.backend);
        let result = tokio::task::spawn_blocking(move || backend.save(&document)).await;
        match result {
            Ok(Ok(())) => {
                state.dirty = false;
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(StoreError::TaskJoin(e)),
        }
    }
}
