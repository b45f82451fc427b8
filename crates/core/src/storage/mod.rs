//! Durable storage for built artifacts.

mod config;
mod error;
mod fs_store;

pub use config::StorageConfig;
pub use error::StorageError;
pub use fs_store::FsArtifactStore;

use std::path::Path;

use async_trait::async_trait;

/// Uploads build artifacts and hands back a retrievable URL.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Returns the name of this store implementation.
    fn name(&self) -> &str;

    /// Upload `local_dir/file_name` to `destination` (a relative,
    /// `/`-separated path) and return its public URL.
    async fn upload(
        &self,
        local_dir: &Path,
        file_name: &str,
        destination: &str,
    ) -> Result<String, StorageError>;
}
