//! Isolated, disposable build workspaces.
//!
//! A workspace is keyed by its build identity so concurrent builds never
//! share mutable state. The orchestrator needs a command that builds into
//! it, a way to read small text files back out, an artifact export to the
//! host, and teardown. A cancelled build also stops what is still running.

mod config;
mod docker;
mod error;

pub use config::DockerConfig;
pub use docker::DockerEnvironment;
pub use error::WorkspaceError;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::build::{BuildIdentity, BuildParameters};
use crate::process::ProcessSpec;

/// A provisioned workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub identity: BuildIdentity,
    /// Backend-specific name (the Docker volume name).
    pub name: String,
    /// Host directory files are exported into.
    pub staging_dir: PathBuf,
}

/// Sandbox a build runs in.
#[async_trait]
pub trait BuildEnvironment: Send + Sync {
    /// Returns the name of this environment implementation.
    fn name(&self) -> &str;

    async fn provision(&self, identity: &BuildIdentity) -> Result<Workspace, WorkspaceError>;

    /// The command that clones and compiles the plugin into `workspace`.
    fn build_command(&self, workspace: &Workspace, parameters: &BuildParameters) -> ProcessSpec;

    /// Read a text file the build produced.
    async fn read_file(&self, workspace: &Workspace, file_name: &str)
        -> Result<String, WorkspaceError>;

    /// Copy a file the build produced into the staging directory and return
    /// that directory.
    async fn export_file(
        &self,
        workspace: &Workspace,
        file_name: &str,
    ) -> Result<PathBuf, WorkspaceError>;

    /// Stop the build command of `workspace` if it is still running.
    /// Called after a cancelled build; the runner only kills the local client.
    async fn abort(&self, workspace: &Workspace) -> Result<(), WorkspaceError>;

    async fn dispose(&self, workspace: &Workspace) -> Result<(), WorkspaceError>;
}

/// Reject names that could escape the workspace output directory.
pub fn validate_file_name(file_name: &str) -> Result<(), WorkspaceError> {
    let trimmed = file_name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed.contains("..")
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || Path::new(trimmed).is_absolute()
    {
        return Err(WorkspaceError::InvalidFileName(file_name.to_string()));
    }
    Ok(())
}
