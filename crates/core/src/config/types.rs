use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::orchestrator::OrchestratorConfig;
use crate::storage::StorageConfig;
use crate::workspace::DockerConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("plugin-builder.db")
}

/// Sanitized config for API responses (host paths hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub orchestrator: OrchestratorConfig,
    pub docker: SanitizedDockerConfig,
    pub storage: SanitizedStorageConfig,
}

/// Docker settings a client may see.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDockerConfig {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// Storage settings a client may see.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub public_base_url: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            orchestrator: config.orchestrator.clone(),
            docker: SanitizedDockerConfig {
                image: config.docker.image.clone(),
                memory_limit: config.docker.memory_limit.clone(),
                cpu_limit: config.docker.cpu_limit.clone(),
                network: config.docker.network.clone(),
            },
            storage: SanitizedStorageConfig {
                public_base_url: config.storage.public_base_url.clone(),
            },
        }
    }
}
