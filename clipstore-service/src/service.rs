//! Storage engine configuration and the shared engine handle.

use std::path::Path;
use std::sync::Arc;

use crate::backend::in_memory::{InMemoryBackend, InMemoryDocumentStore};
use crate::backend::local_fs::{LocalFsBackend, LocalFsDocumentStore};
use crate::backend::{Backend, BoxedBackend, BoxedDocumentStore, DocumentStore};

/// Configuration to initialize a [`StorageEngine`].
#[derive(Debug, Clone)]
pub enum StorageConfig<'a> {
    /// Use a local filesystem directory for chunks and documents.
    FileSystem {
        /// The path to the directory where data will be stored.
        path: &'a Path,
    },
    /// Keep everything in process memory. Data is lost on shutdown.
    Memory,
}

/// Process-wide handle to the underlying storage engine.
///
/// The engine is created once at startup and handed to every component that needs storage.
/// Cloning is cheap and all clones share the same connection.
#[derive(Clone, Debug)]
pub struct StorageEngine(Arc<StorageEngineInner>);

#[derive(Debug)]
struct StorageEngineInner {
    blobs: BoxedBackend,
    documents: BoxedDocumentStore,
}

impl StorageEngine {
    /// Creates a new `StorageEngine` with the specified configuration.
    pub async fn new(config: StorageConfig<'_>) -> anyhow::Result<Self> {
        let engine = match config {
            StorageConfig::FileSystem { path } => {
                tokio::fs::create_dir_all(path).await?;
                tracing::info!(path = %path.display(), "using filesystem storage");
                Self::from_parts(
                    Box::new(LocalFsBackend::new(path)),
                    Box::new(LocalFsDocumentStore::new(path)),
                )
            }
            StorageConfig::Memory => {
                tracing::warn!("using in-memory storage, data will not be persisted");
                Self::in_memory()
            }
        };

        Ok(engine)
    }

    /// Creates an engine that keeps all data in memory.
    pub fn in_memory() -> Self {
        Self::from_parts(
            Box::new(InMemoryBackend::new()),
            Box::new(InMemoryDocumentStore::new()),
        )
    }

    /// Assembles an engine from explicit blob and document stores.
    pub fn from_parts(blobs: BoxedBackend, documents: BoxedDocumentStore) -> Self {
        Self(Arc::new(StorageEngineInner { blobs, documents }))
    }

    pub(crate) fn blobs(&self) -> &dyn Backend {
        self.0.blobs.as_ref()
    }

    pub(crate) fn documents(&self) -> &dyn DocumentStore {
        self.0.documents.as_ref()
    }
}
