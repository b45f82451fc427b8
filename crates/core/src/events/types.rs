use serde::{Deserialize, Serialize};

use crate::build::{BuildIdentity, BuildState};

/// Kinds of events a subscriber can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BuildLogUpdated,
    BuildChanged,
}

/// Event published on the [`EventBus`](super::EventBus).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildEvent {
    /// A line was appended to a build's log.
    BuildLogUpdated { identity: BuildIdentity, line: String },
    /// A build moved to a new state.
    BuildChanged {
        identity: BuildIdentity,
        state: BuildState,
        /// The buildInfo delta written with this transition (JSON).
        #[serde(skip_serializing_if = "Option::is_none")]
        build_info: Option<String>,
        /// The manifest recorded with this transition (JSON).
        #[serde(skip_serializing_if = "Option::is_none")]
        manifest_info: Option<String>,
    },
}

impl BuildEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BuildEvent::BuildLogUpdated { .. } => EventKind::BuildLogUpdated,
            BuildEvent::BuildChanged { .. } => EventKind::BuildChanged,
        }
    }

    pub fn identity(&self) -> &BuildIdentity {
        match self {
            BuildEvent::BuildLogUpdated { identity, .. } => identity,
            BuildEvent::BuildChanged { identity, .. } => identity,
        }
    }
}
