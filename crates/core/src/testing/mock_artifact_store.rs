//! Mock artifact store for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::storage::{ArtifactStore, StorageError};

/// A recorded upload for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub local_dir: PathBuf,
    pub file_name: String,
    pub destination: String,
}

/// Mock implementation of the ArtifactStore trait.
///
/// Returns `https://store/<destination>` unless a fixed URL is configured.
#[derive(Debug)]
pub struct MockArtifactStore {
    uploads: Arc<RwLock<Vec<RecordedUpload>>>,
    fixed_url: Arc<RwLock<Option<String>>>,
    next_error: Arc<RwLock<Option<String>>>,
}

impl Default for MockArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockArtifactStore {
    pub fn new() -> Self {
        Self {
            uploads: Arc::new(RwLock::new(Vec::new())),
            fixed_url: Arc::new(RwLock::new(None)),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Return this URL for every upload.
    pub async fn set_url(&self, url: impl Into<String>) {
        *self.fixed_url.write().await = Some(url.into());
    }

    /// Configure the next upload to be rejected with this message.
    pub async fn set_next_error(&self, message: impl Into<String>) {
        *self.next_error.write().await = Some(message.into());
    }

    pub async fn recorded_uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.read().await.clone()
    }

    pub async fn upload_count(&self) -> usize {
        self.uploads.read().await.len()
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn upload(
        &self,
        local_dir: &Path,
        file_name: &str,
        destination: &str,
    ) -> Result<String, StorageError> {
        if let Some(message) = self.next_error.write().await.take() {
            return Err(StorageError::Rejected(message));
        }

        self.uploads.write().await.push(RecordedUpload {
            local_dir: local_dir.to_path_buf(),
            file_name: file_name.to_string(),
            destination: destination.to_string(),
        });

        Ok(match self.fixed_url.read().await.clone() {
            Some(url) => url,
            None => format!("https://store/{}", destination),
        })
    }
}
