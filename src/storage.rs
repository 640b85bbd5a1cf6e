//! Object storage for document content and thumbnails.
//!
//! The pipeline only needs `put(bytes) -> locator` / `get(locator) -> bytes`;
//! the production object store lives outside this crate. A filesystem store
//! backs the CLI and an in-memory store backs tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Document;

/// Errors from object-store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content-addressed blob storage capability.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes and return a locator for later retrieval.
    async fn put(&self, bytes: &[u8], extension: &str) -> Result<String, StorageError>;

    /// Fetch bytes by locator.
    async fn get(&self, locator: &str) -> Result<Vec<u8>, StorageError>;
}

/// Map a MIME type to a file extension for stored content.
pub fn mime_to_extension(mime: &str) -> &'static str {
    match mime {
        "application/pdf" => "pdf",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Construct the storage path for content.
///
/// Uses a two-level directory structure based on hash prefix for filesystem
/// efficiency: `{root}/{hash[0..2]}/{hash[0..16]}.{extension}`
fn content_storage_path(root: &Path, content_hash: &str, extension: &str) -> PathBuf {
    root.join(&content_hash[..2])
        .join(format!("{}.{}", &content_hash[..16], extension))
}

/// Filesystem-backed object store with content-addressed paths.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, bytes: &[u8], extension: &str) -> Result<String, StorageError> {
        let hash = Document::compute_checksum(bytes);
        let path = content_storage_path(&self.root, &hash, extension);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        let locator = path
            .strip_prefix(&self.root)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.root.join(locator);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(locator.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory object store for tests and embedded use.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bytes: &[u8], extension: &str) -> Result<String, StorageError> {
        let hash = Document::compute_checksum(bytes);
        let locator = format!("{}.{}", &hash[..16], extension);
        self.objects
            .lock()
            .expect("store mutex poisoned")
            .insert(locator.clone(), bytes.to_vec());
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .expect("store mutex poisoned")
            .get(locator)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(locator.to_string()))
    }
}
