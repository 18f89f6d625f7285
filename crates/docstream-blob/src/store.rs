//! Blob store over an `object_store` backend
//!
//! All paths are deterministic functions of document and job ids, so
//! concurrent writers never collide and retries overwrite idempotently:
//!
//! - `raw/{document_id}/{filename}` - original upload
//! - `extracted/{document_id}.txt` - extracted text
//! - `embeddings/{job_id}.snapshot` - per-job vector snapshots

use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{DynObjectStore, ObjectStore, PutPayload, local::LocalFileSystem};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{BlobError, BlobResult};

/// Path-addressed storage for raw uploads, extracted text, and snapshots
#[derive(Clone)]
pub struct BlobStore {
    store: Arc<DynObjectStore>,
}

impl BlobStore {
    pub fn new(store: Arc<DynObjectStore>) -> Self {
        Self { store }
    }

    /// In-memory store for tests and ephemeral deployments
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Local filesystem store rooted at `root`
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be used.
    pub fn local(root: &str) -> BlobResult<Self> {
        std::fs::create_dir_all(root).map_err(|e| {
            BlobError::Storage(object_store::Error::Generic {
                store: "LocalFileSystem",
                source: Box::new(e),
            })
        })?;
        let store = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Path of the raw upload for a document
    pub fn raw_path(document_id: &Uuid, filename: &str) -> Path {
        Path::from(format!("raw/{document_id}/{filename}"))
    }

    /// Path of the extracted text for a document
    pub fn extracted_path(document_id: &Uuid) -> Path {
        Path::from(format!("extracted/{document_id}.txt"))
    }

    /// Path of the vector snapshot for an embed job
    pub fn snapshot_path(job_id: &Uuid) -> Path {
        Path::from(format!("embeddings/{job_id}.snapshot"))
    }

    /// Store an object, replacing any existing content at the path
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    #[tracing::instrument(skip(self, bytes), fields(%path, len = bytes.len()))]
    pub async fn put(&self, path: &Path, bytes: Bytes) -> BlobResult<()> {
        self.store.put(path, PutPayload::from_bytes(bytes)).await?;
        Ok(())
    }

    /// Fetch an object's full contents
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::NotFound`] if the object does not exist, or a
    /// storage error on backend failure.
    #[tracing::instrument(skip(self), fields(%path))]
    pub async fn get(&self, path: &Path) -> BlobResult<Bytes> {
        match self.store.get(path).await {
            Ok(result) => Ok(result.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => Err(BlobError::NotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(BlobError::Storage(e)),
        }
    }

    /// Delete an object. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure other than not-found.
    pub async fn delete(&self, path: &Path) -> BlobResult<bool> {
        match self.store.delete(path).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(BlobError::Storage(e)),
        }
    }

    /// Whether an object exists at the path
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure other than not-found.
    pub async fn exists(&self, path: &Path) -> BlobResult<bool> {
        match self.store.head(path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(BlobError::Storage(e)),
        }
    }
}
