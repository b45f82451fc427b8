//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the build orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum builds holding a slot at once. Further builds wait.
    #[serde(default = "default_max_concurrent_builds")]
    pub max_concurrent_builds: usize,

    /// Backlog of an event subscriber at which a warning is logged.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// Keep workspaces after the pipeline ends (debugging aid).
    #[serde(default)]
    pub keep_workspaces: bool,

    /// Register new versions as pre-releases.
    #[serde(default = "default_true")]
    pub register_as_pre_release: bool,
}

fn default_max_concurrent_builds() -> usize {
    5
}

fn default_event_buffer_size() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_builds: default_max_concurrent_builds(),
            event_buffer_size: default_event_buffer_size(),
            keep_workspaces: false,
            register_as_pre_release: true,
        }
    }
}
