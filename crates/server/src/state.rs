use std::sync::Arc;

use plugin_builder_core::{BuildOrchestrator, BuildStore, Config, EventBus, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<BuildOrchestrator>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<BuildOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &Arc<BuildOrchestrator> {
        &self.orchestrator
    }

    pub fn store(&self) -> &dyn BuildStore {
        self.orchestrator.store().as_ref()
    }

    pub fn events(&self) -> &EventBus {
        self.orchestrator.events()
    }
}
