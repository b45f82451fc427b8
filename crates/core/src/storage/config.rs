//! Configuration for the artifact store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the file system artifact store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory uploaded artifacts are written under.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// URL prefix under which `root` is publicly served.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Buffer size for file copies in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_root() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_public_base_url() -> String {
    "http://localhost:8080/artifacts".to_string()
}

fn default_buffer_size() -> usize {
    1024 * 1024 // 1 MB
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            public_base_url: default_public_base_url(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl StorageConfig {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = url.into();
        self
    }

    /// Public URL of an object stored at `destination`.
    pub fn public_url(&self, destination: &str) -> String {
        format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            destination.trim_start_matches('/')
        )
    }
}
