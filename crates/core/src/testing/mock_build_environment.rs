//! Mock build environment for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::build::{BuildIdentity, BuildParameters};
use crate::process::ProcessSpec;
use crate::workspace::{validate_file_name, BuildEnvironment, Workspace, WorkspaceError};

/// Mock implementation of the BuildEnvironment trait.
///
/// Provides controllable behavior for testing:
/// - Serve workspace files from an in-memory map
/// - Simulate provisioning failures
/// - Track provisioned, aborted and disposed workspaces
///
/// Every workspace sees the same file map.
#[derive(Debug)]
pub struct MockBuildEnvironment {
    files: Arc<RwLock<HashMap<String, String>>>,
    provision_error: Arc<RwLock<Option<String>>>,
    provisioned: Arc<RwLock<Vec<BuildIdentity>>>,
    aborted: Arc<RwLock<Vec<Workspace>>>,
    disposed: Arc<RwLock<Vec<Workspace>>>,
    exported: Arc<RwLock<Vec<String>>>,
}

impl Default for MockBuildEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBuildEnvironment {
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(HashMap::new())),
            provision_error: Arc::new(RwLock::new(None)),
            provisioned: Arc::new(RwLock::new(Vec::new())),
            aborted: Arc::new(RwLock::new(Vec::new())),
            disposed: Arc::new(RwLock::new(Vec::new())),
            exported: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Make `file_name` readable (and exportable) from every workspace.
    pub async fn set_file(&self, file_name: &str, content: &str) {
        self.files
            .write()
            .await
            .insert(file_name.to_string(), content.to_string());
    }

    pub async fn remove_file(&self, file_name: &str) {
        self.files.write().await.remove(file_name);
    }

    /// Make provisioning fail with this message.
    pub async fn set_provision_error(&self, message: Option<String>) {
        *self.provision_error.write().await = message;
    }

    pub async fn provisioned(&self) -> Vec<BuildIdentity> {
        self.provisioned.read().await.clone()
    }

    pub async fn aborted(&self) -> Vec<Workspace> {
        self.aborted.read().await.clone()
    }

    pub async fn disposed(&self) -> Vec<Workspace> {
        self.disposed.read().await.clone()
    }

    /// File names passed to `export_file`.
    pub async fn exported(&self) -> Vec<String> {
        self.exported.read().await.clone()
    }

    fn workspace_name(identity: &BuildIdentity) -> String {
        format!("mock-{}-{}", identity.plugin_slug, identity.build_id)
    }
}

#[async_trait]
impl BuildEnvironment for MockBuildEnvironment {
    fn name(&self) -> &str {
        "mock"
    }

    async fn provision(&self, identity: &BuildIdentity) -> Result<Workspace, WorkspaceError> {
        if let Some(message) = self.provision_error.read().await.clone() {
            return Err(WorkspaceError::CommandFailed {
                command: "provision".to_string(),
                code: Some(1),
                output: message,
            });
        }

        self.provisioned.write().await.push(identity.clone());
        let name = Self::workspace_name(identity);
        Ok(Workspace {
            identity: identity.clone(),
            staging_dir: PathBuf::from("/mock/staging").join(&name),
            name,
        })
    }

    fn build_command(&self, workspace: &Workspace, parameters: &BuildParameters) -> ProcessSpec {
        let mut spec = ProcessSpec::new("mock-build")
            .arg(&workspace.name)
            .env("GIT_REPO", &parameters.git_repository);
        if let Some(ref git_ref) = parameters.git_ref {
            spec = spec.env("GIT_REF", git_ref);
        }
        spec
    }

    async fn read_file(
        &self,
        workspace: &Workspace,
        file_name: &str,
    ) -> Result<String, WorkspaceError> {
        validate_file_name(file_name)?;
        self.files
            .read()
            .await
            .get(file_name)
            .cloned()
            .ok_or_else(|| WorkspaceError::FileMissing {
                workspace: workspace.name.clone(),
                file: file_name.to_string(),
            })
    }

    async fn export_file(
        &self,
        workspace: &Workspace,
        file_name: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        validate_file_name(file_name)?;
        if !self.files.read().await.contains_key(file_name) {
            return Err(WorkspaceError::FileMissing {
                workspace: workspace.name.clone(),
                file: file_name.to_string(),
            });
        }
        self.exported.write().await.push(file_name.to_string());
        Ok(workspace.staging_dir.clone())
    }

    async fn abort(&self, workspace: &Workspace) -> Result<(), WorkspaceError> {
        self.aborted.write().await.push(workspace.clone());
        Ok(())
    }

    async fn dispose(&self, workspace: &Workspace) -> Result<(), WorkspaceError> {
        self.disposed.write().await.push(workspace.clone());
        Ok(())
    }
}
