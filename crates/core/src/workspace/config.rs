//! Configuration for the Docker build environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How builds are sandboxed in Docker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Path to the docker CLI.
    #[serde(default = "default_docker_path")]
    pub docker_path: String,

    /// Builder image; clones the repository and writes its outputs to `/out`.
    #[serde(default = "default_image")]
    pub image: String,

    /// Label key attached to every build volume.
    #[serde(default = "default_volume_label")]
    pub volume_label: String,

    /// Host directory artifacts are exported to before upload.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Memory limit passed to `docker run --memory` (e.g. "2g").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,

    /// CPU limit passed to `docker run --cpus` (e.g. "1.5").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,

    /// Network the build container joins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

fn default_docker_path() -> String {
    "docker".to_string()
}

fn default_image() -> String {
    "plugin-builder".to_string()
}

fn default_volume_label() -> String {
    "BTCPAY_PLUGIN_BUILD".to_string()
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("plugin-builder")
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            docker_path: default_docker_path(),
            image: default_image(),
            volume_label: default_volume_label(),
            staging_dir: default_staging_dir(),
            memory_limit: None,
            cpu_limit: None,
            network: None,
        }
    }
}

impl DockerConfig {
    pub fn with_docker_path(mut self, path: impl Into<String>) -> Self {
        self.docker_path = path.into();
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn with_memory_limit(mut self, limit: impl Into<String>) -> Self {
        self.memory_limit = Some(limit.into());
        self
    }

    pub fn with_cpu_limit(mut self, limit: impl Into<String>) -> Self {
        self.cpu_limit = Some(limit.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }
}
