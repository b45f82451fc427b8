//! Types for the build orchestrator.

use serde::Serialize;
use thiserror::Error;

use crate::build::{BuildIdentity, BuildState};
use crate::manifest::PluginVersion;
use crate::store::StoreError;

/// Why a build failed.
///
/// The `Display` text of a hard failure is exactly what gets persisted as
/// the build's `error`.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to provision build workspace: {0}")]
    Provisioning(String),

    #[error("Build failed: {0}")]
    Execution(String),

    #[error("Failed to read build output: {0}")]
    ArtifactRead(String),

    #[error("Invalid plugin manifest: {0}")]
    MalformedManifest(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    /// Soft failure: recorded in the build log only.
    #[error("The plugin identifier {identifier} doesn't belong to this project slug")]
    OwnershipMismatch { identifier: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl BuildError {
    /// The pipeline phase this error belongs to.
    pub fn phase(&self) -> &'static str {
        match self {
            BuildError::Provisioning(_) => "provisioning",
            BuildError::Execution(_) => "execution",
            BuildError::ArtifactRead(_) => "artifact_read",
            BuildError::MalformedManifest(_) => "manifest",
            BuildError::Upload(_) => "upload",
            BuildError::OwnershipMismatch { .. } => "ownership",
            BuildError::Store(_) => "store",
        }
    }

    /// Whether the build is moved to `Failed` for this error.
    pub fn is_hard(&self) -> bool {
        !matches!(self, BuildError::OwnershipMismatch { .. })
    }
}

/// What happened to the version declared by an uploaded build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VersionRegistration {
    Registered { version: PluginVersion },
    OwnershipMismatch { identifier: String },
    /// Registration could not be attempted; the reason is in the build log.
    Skipped { reason: String },
}

/// How a build ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BuildOutcome {
    Uploaded {
        url: String,
        registration: VersionRegistration,
    },
    /// Stopped on request. The record keeps `last_state`.
    Cancelled { last_state: BuildState },
}

impl BuildOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            BuildOutcome::Uploaded { .. } => "uploaded",
            BuildOutcome::Cancelled { .. } => "cancelled",
        }
    }
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorStatus {
    /// Size of the slot pool.
    pub capacity: usize,
    /// Slots currently held.
    pub in_use: usize,
    pub available: usize,
    /// Whether the gate stopped admitting builds.
    pub closed: bool,
    /// Submitted builds that have not finished yet (running or waiting).
    pub active_builds: Vec<BuildIdentity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BuildError::MalformedManifest("missing required field 'version'".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid plugin manifest: missing required field 'version'"
        );
        assert_eq!(err.phase(), "manifest");
        assert!(err.is_hard());

        let err = BuildError::OwnershipMismatch {
            identifier: "unowned-plugin-x".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "The plugin identifier unowned-plugin-x doesn't belong to this project slug"
        );
        assert!(!err.is_hard());
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = BuildOutcome::Cancelled {
            last_state: BuildState::Running,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "cancelled");
        assert_eq!(json["last_state"], "running");
        assert_eq!(outcome.label(), "cancelled");
    }
}
