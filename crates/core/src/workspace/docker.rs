//! Docker-volume backed build environment.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::config::DockerConfig;
use super::error::WorkspaceError;
use super::{validate_file_name, BuildEnvironment, Workspace};
use crate::build::{BuildIdentity, BuildParameters};
use crate::process::{CancelSignal, OutputCapture, ProcessOutcome, ProcessRunner, ProcessSpec};

const OUT_DIR: &str = "/out";
const EXPORT_DIR: &str = "/export";

/// Runs builds in the builder image with a per-build Docker volume.
pub struct DockerEnvironment {
    config: DockerConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl DockerEnvironment {
    pub fn new(config: DockerConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &DockerConfig {
        &self.config
    }

    fn docker(&self) -> ProcessSpec {
        ProcessSpec::new(&self.config.docker_path)
    }

    /// Name of the container a workspace's build runs in.
    pub fn container_name(workspace: &Workspace) -> String {
        format!(
            "plugin-builder-{}-{}",
            workspace.identity.plugin_slug, workspace.identity.build_id
        )
    }

    fn staging_dir_for(&self, identity: &BuildIdentity) -> PathBuf {
        self.config
            .staging_dir
            .join(identity.plugin_slug.as_str())
            .join(identity.build_id.to_string())
    }

    /// Run a short docker command and return its stdout.
    async fn run_captured(&self, what: &str, spec: ProcessSpec) -> Result<String, WorkspaceError> {
        debug!("Running {}", spec);
        let stdout = OutputCapture::new();
        let stderr = OutputCapture::new();
        let outcome = self
            .runner
            .run(&spec, &stdout, &stderr, &CancelSignal::never())
            .await?;

        match outcome {
            ProcessOutcome::Exited { code: Some(0) } => Ok(stdout.text()),
            ProcessOutcome::Exited { code } => Err(WorkspaceError::CommandFailed {
                command: what.to_string(),
                code,
                output: stderr.text(),
            }),
            ProcessOutcome::Cancelled => Err(WorkspaceError::Cancelled {
                command: what.to_string(),
            }),
        }
    }
}

#[async_trait]
impl BuildEnvironment for DockerEnvironment {
    fn name(&self) -> &str {
        "docker"
    }

    async fn provision(&self, identity: &BuildIdentity) -> Result<Workspace, WorkspaceError> {
        let spec = self.docker().args([
            "volume".to_string(),
            "create".to_string(),
            "--label".to_string(),
            format!("{}={}", self.config.volume_label, identity),
        ]);
        let output = self.run_captured("docker volume create", spec).await?;

        let name = output.trim().to_string();
        if name.is_empty() {
            return Err(WorkspaceError::CommandFailed {
                command: "docker volume create".to_string(),
                code: Some(0),
                output: "no volume name returned".to_string(),
            });
        }

        info!("Provisioned volume {} for build {}", name, identity);
        Ok(Workspace {
            identity: identity.clone(),
            name,
            staging_dir: self.staging_dir_for(identity),
        })
    }

    fn build_command(&self, workspace: &Workspace, parameters: &BuildParameters) -> ProcessSpec {
        let mut spec = self.docker().args([
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            Self::container_name(workspace),
            "--label".to_string(),
            format!("{}={}", self.config.volume_label, workspace.identity),
        ]);

        let env = [
            ("GIT_REPO", Some(&parameters.git_repository)),
            ("GIT_REF", parameters.git_ref.as_ref()),
            ("PLUGIN_DIR", parameters.plugin_directory.as_ref()),
            ("BUILD_CONFIG", parameters.build_config.as_ref()),
        ];
        for (key, value) in env.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))) {
            spec = spec.arg("--env").arg(format!("{}={}", key, value));
        }

        if let Some(ref memory) = self.config.memory_limit {
            spec = spec.arg("--memory").arg(memory);
        }
        if let Some(ref cpus) = self.config.cpu_limit {
            spec = spec.arg("--cpus").arg(cpus);
        }
        if let Some(ref network) = self.config.network {
            spec = spec.arg("--network").arg(network);
        }

        spec.arg("-v")
            .arg(format!("{}:{}", workspace.name, OUT_DIR))
            .arg(&self.config.image)
    }

    async fn read_file(
        &self,
        workspace: &Workspace,
        file_name: &str,
    ) -> Result<String, WorkspaceError> {
        validate_file_name(file_name)?;
        let spec = self.docker().args([
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:{}", workspace.name, OUT_DIR),
            self.config.image.clone(),
            "cat".to_string(),
            format!("{}/{}", OUT_DIR, file_name),
        ]);
        self.run_captured(&format!("reading {}", file_name), spec)
            .await
    }

    async fn export_file(
        &self,
        workspace: &Workspace,
        file_name: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        validate_file_name(file_name)?;
        tokio::fs::create_dir_all(&workspace.staging_dir)
            .await
            .map_err(|e| WorkspaceError::io(&workspace.staging_dir, e))?;
        // Bind mounts need an absolute host path.
        let staging = tokio::fs::canonicalize(&workspace.staging_dir)
            .await
            .map_err(|e| WorkspaceError::io(&workspace.staging_dir, e))?;

        let spec = self.docker().args([
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:{}", workspace.name, OUT_DIR),
            "-v".to_string(),
            format!("{}:{}", staging.display(), EXPORT_DIR),
            self.config.image.clone(),
            "cp".to_string(),
            format!("{}/{}", OUT_DIR, file_name),
            format!("{}/{}", EXPORT_DIR, file_name),
        ]);
        self.run_captured(&format!("exporting {}", file_name), spec)
            .await?;

        if !staging.join(file_name).is_file() {
            return Err(WorkspaceError::FileMissing {
                workspace: workspace.name.clone(),
                file: file_name.to_string(),
            });
        }
        Ok(staging)
    }

    async fn abort(&self, workspace: &Workspace) -> Result<(), WorkspaceError> {
        let container = Self::container_name(workspace);
        let spec = self.docker().args(["rm", "-f"]).arg(&container);

        match self.run_captured("docker rm", spec).await {
            Ok(_) => {
                info!("Removed container {} of build {}", container, workspace.identity);
                Ok(())
            }
            // The container already exited and removed itself
            Err(WorkspaceError::CommandFailed { ref output, .. })
                if output.contains("No such container") =>
            {
                debug!("Container {} already gone", container);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn dispose(&self, workspace: &Workspace) -> Result<(), WorkspaceError> {
        let spec = self
            .docker()
            .args(["volume", "rm", "-f"])
            .arg(&workspace.name);
        let volume_result = self.run_captured("docker volume rm", spec).await;

        let staging_result = match tokio::fs::remove_dir_all(&workspace.staging_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkspaceError::io(&workspace.staging_dir, e)),
        };

        if let Err(ref e) = volume_result {
            warn!("Failed to remove volume {}: {}", workspace.name, e);
        }
        debug!("Disposed workspace {} of build {}", workspace.name, workspace.identity);
        volume_result.map(|_| ())?;
        staging_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::PluginSlug;
    use crate::testing::{MockProcessRunner, ScriptedRun};
    use tempfile::TempDir;

    fn identity() -> BuildIdentity {
        BuildIdentity::new(PluginSlug::new("my-plugin").unwrap(), 7)
    }

    fn environment(runner: Arc<MockProcessRunner>, staging: &TempDir) -> DockerEnvironment {
        DockerEnvironment::new(
            DockerConfig::default().with_staging_dir(staging.path()),
            runner,
        )
    }

    fn workspace(staging: &TempDir) -> Workspace {
        Workspace {
            identity: identity(),
            name: "vol123".to_string(),
            staging_dir: staging.path().join("my-plugin").join("7"),
        }
    }

    #[tokio::test]
    async fn test_provision_creates_labelled_volume() {
        let staging = TempDir::new().unwrap();
        let runner = Arc::new(MockProcessRunner::new());
        runner
            .push(ScriptedRun::success().with_stdout(["vol123"]))
            .await;

        let ws = environment(runner.clone(), &staging)
            .provision(&identity())
            .await
            .unwrap();

        assert_eq!(ws.name, "vol123");
        assert_eq!(ws.staging_dir, staging.path().join("my-plugin").join("7"));
        let specs = runner.recorded_specs().await;
        assert_eq!(specs[0].program, "docker");
        assert_eq!(
            specs[0].args,
            vec!["volume", "create", "--label", "BTCPAY_PLUGIN_BUILD=my-plugin/7"]
        );
    }

    #[tokio::test]
    async fn test_provision_failure() {
        let staging = TempDir::new().unwrap();
        let runner = Arc::new(MockProcessRunner::new());
        runner
            .push(ScriptedRun::exit(1).with_stderr(["Cannot connect to the Docker daemon"]))
            .await;

        let err = environment(runner, &staging)
            .provision(&identity())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::CommandFailed { code: Some(1), .. }));
        assert!(err.to_string().contains("Cannot connect"));
    }

    #[tokio::test]
    async fn test_provision_without_volume_name() {
        let staging = TempDir::new().unwrap();
        let runner = Arc::new(MockProcessRunner::new());
        runner.push(ScriptedRun::success()).await;

        assert!(environment(runner, &staging)
            .provision(&identity())
            .await
            .is_err());
    }

    #[test]
    fn test_build_command_passes_parameters_and_limits() {
        let staging = TempDir::new().unwrap();
        let env = DockerEnvironment::new(
            DockerConfig::default()
                .with_staging_dir(staging.path())
                .with_memory_limit("2g")
                .with_cpu_limit("1.5")
                .with_network("builds"),
            Arc::new(MockProcessRunner::new()),
        );
        let params = BuildParameters::new("https://github.com/example/plugin.git")
            .with_git_ref("v1.0.0")
            .with_plugin_directory("Plugins/MyPlugin");

        let spec = env.build_command(&workspace(&staging), &params);
        let args = spec.args.join(" ");

        assert_eq!(spec.program, "docker");
        assert!(args.starts_with(
            "run --rm --name plugin-builder-my-plugin-7 --label BTCPAY_PLUGIN_BUILD=my-plugin/7"
        ));
        assert!(args.contains("--env GIT_REPO=https://github.com/example/plugin.git"));
        assert!(args.contains("--env GIT_REF=v1.0.0"));
        assert!(args.contains("--env PLUGIN_DIR=Plugins/MyPlugin"));
        assert!(!args.contains("BUILD_CONFIG"));
        assert!(args.contains("--memory 2g --cpus 1.5 --network builds"));
        assert!(args.ends_with("-v vol123:/out plugin-builder"));
    }

    #[tokio::test]
    async fn test_abort_removes_build_container() {
        let staging = TempDir::new().unwrap();
        let runner = Arc::new(MockProcessRunner::new());

        environment(runner.clone(), &staging)
            .abort(&workspace(&staging))
            .await
            .unwrap();

        assert_eq!(
            runner.recorded_specs().await[0].args,
            vec!["rm", "-f", "plugin-builder-my-plugin-7"]
        );
    }

    #[tokio::test]
    async fn test_abort_tolerates_missing_container() {
        let staging = TempDir::new().unwrap();
        let runner = Arc::new(MockProcessRunner::new());
        runner
            .push(
                ScriptedRun::exit(1)
                    .with_stderr(["Error: No such container: plugin-builder-my-plugin-7"]),
            )
            .await;
        runner
            .push(ScriptedRun::exit(1).with_stderr(["Cannot connect to the Docker daemon"]))
            .await;
        let env = environment(runner, &staging);

        assert!(env.abort(&workspace(&staging)).await.is_ok());
        assert!(env.abort(&workspace(&staging)).await.is_err());
    }

    #[tokio::test]
    async fn test_read_file_cats_from_volume() {
        let staging = TempDir::new().unwrap();
        let runner = Arc::new(MockProcessRunner::new());
        runner
            .push(ScriptedRun::success().with_stdout([r#"{"assemblyName":"MyPlugin"}"#]))
            .await;

        let text = environment(runner.clone(), &staging)
            .read_file(&workspace(&staging), "build-env.json")
            .await
            .unwrap();

        assert_eq!(text, r#"{"assemblyName":"MyPlugin"}"#);
        let specs = runner.recorded_specs().await;
        assert_eq!(
            specs[0].args,
            vec!["run", "--rm", "-v", "vol123:/out", "plugin-builder", "cat", "/out/build-env.json"]
        );
    }

    #[tokio::test]
    async fn test_read_file_rejects_traversal_without_running() {
        let staging = TempDir::new().unwrap();
        let runner = Arc::new(MockProcessRunner::new());

        let err = environment(runner.clone(), &staging)
            .read_file(&workspace(&staging), "../etc/passwd")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidFileName(_)));
        assert_eq!(runner.run_count().await, 0);
    }

    #[tokio::test]
    async fn test_export_reports_missing_file() {
        let staging = TempDir::new().unwrap();
        let runner = Arc::new(MockProcessRunner::new());
        let ws = workspace(&staging);

        let err = environment(runner.clone(), &staging)
            .export_file(&ws, "MyPlugin.btcpay")
            .await
            .unwrap_err();

        assert!(matches!(err, WorkspaceError::FileMissing { .. }));
        assert!(ws.staging_dir.is_dir());
        let args = runner.recorded_specs().await[0].args.join(" ");
        assert!(args.contains("cp /out/MyPlugin.btcpay /export/MyPlugin.btcpay"));
    }

    #[tokio::test]
    async fn test_export_returns_staging_dir() {
        let staging = TempDir::new().unwrap();
        let runner = Arc::new(MockProcessRunner::new());
        let ws = workspace(&staging);
        std::fs::create_dir_all(&ws.staging_dir).unwrap();
        std::fs::write(ws.staging_dir.join("MyPlugin.btcpay"), b"zip").unwrap();

        let dir = environment(runner, &staging)
            .export_file(&ws, "MyPlugin.btcpay")
            .await
            .unwrap();
        assert_eq!(dir, ws.staging_dir.canonicalize().unwrap());
    }

    #[tokio::test]
    async fn test_dispose_removes_volume_and_staging() {
        let staging = TempDir::new().unwrap();
        let runner = Arc::new(MockProcessRunner::new());
        let ws = workspace(&staging);
        std::fs::create_dir_all(&ws.staging_dir).unwrap();

        environment(runner.clone(), &staging)
            .dispose(&ws)
            .await
            .unwrap();

        assert!(!ws.staging_dir.exists());
        assert_eq!(
            runner.recorded_specs().await[0].args,
            vec!["volume", "rm", "-f", "vol123"]
        );
    }

    #[tokio::test]
    async fn test_dispose_still_cleans_staging_when_volume_removal_fails() {
        let staging = TempDir::new().unwrap();
        let runner = Arc::new(MockProcessRunner::new());
        runner.push(ScriptedRun::exit(1)).await;
        let ws = workspace(&staging);
        std::fs::create_dir_all(&ws.staging_dir).unwrap();

        let result = environment(runner, &staging).dispose(&ws).await;
        assert!(result.is_err());
        assert!(!ws.staging_dir.exists());
    }
}
