//! File system artifact store.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info};

use super::config::StorageConfig;
use super::error::StorageError;
use super::ArtifactStore;

/// Stores artifacts under a local directory that is served over HTTP.
pub struct FsArtifactStore {
    config: StorageConfig,
}

impl FsArtifactStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    fn resolve(&self, destination: &str) -> Result<PathBuf, StorageError> {
        if destination.trim().is_empty() {
            return Err(StorageError::invalid_destination(destination, "empty path"));
        }
        let relative = Path::new(destination);
        let mut resolved = self.config.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(StorageError::invalid_destination(
                        destination,
                        "parent directory references are not allowed",
                    ))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::invalid_destination(
                        destination,
                        "must be a relative path",
                    ))
                }
            }
        }
        Ok(resolved)
    }

    /// Copies `source` to `destination`, returning the byte count and SHA-256.
    async fn copy_file(
        &self,
        source: &Path,
        destination: &Path,
    ) -> Result<(u64, String), StorageError> {
        let source_file = File::open(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::SourceNotFound {
                    path: source.to_path_buf(),
                }
            } else {
                StorageError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
            }
        })?;

        let dest_file = File::create(destination).await.map_err(|e| {
            StorageError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
        })?;

        let buffer_size = self.config.buffer_size.max(4096);
        let mut reader = BufReader::with_capacity(buffer_size, source_file);
        let mut writer = BufWriter::with_capacity(buffer_size, dest_file);
        let mut hasher = Sha256::new();
        let mut total_bytes = 0u64;
        let mut buffer = vec![0u8; buffer_size];

        loop {
            let bytes_read = reader.read(&mut buffer).await.map_err(|e| {
                StorageError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
            })?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
            writer.write_all(&buffer[..bytes_read]).await.map_err(|e| {
                StorageError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
            })?;
            total_bytes += bytes_read as u64;
        }

        writer.flush().await.map_err(|e| {
            StorageError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
        })?;

        Ok((total_bytes, format!("{:x}", hasher.finalize())))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn upload(
        &self,
        local_dir: &Path,
        file_name: &str,
        destination: &str,
    ) -> Result<String, StorageError> {
        let start = Instant::now();
        let source = local_dir.join(file_name);
        let target = self.resolve(destination)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::DirectoryCreationFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        // Write next to the target and rename so readers never see a partial file.
        let partial = target.with_extension("partial");
        let (bytes, checksum) = match self.copy_file(&source, &partial).await {
            Ok(result) => result,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        fs::rename(&partial, &target)
            .await
            .map_err(|e| StorageError::copy_failed(partial.clone(), target.clone(), e))?;

        let url = self.config.public_url(destination);
        info!(
            "Stored artifact {} ({} bytes, sha256 {}) in {:?}",
            destination,
            bytes,
            checksum,
            start.elapsed()
        );
        debug!("Artifact {} available at {}", destination, url);
        Ok(url)
    }
}
