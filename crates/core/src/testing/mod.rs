//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the orchestrator's external
//! collaborators, so the whole pipeline can be exercised without Docker or
//! real blob storage.
//!
//! # Example
//!
//! ```rust,ignore
//! use plugin_builder_core::testing::{fixtures, MockArtifactStore, MockProcessRunner};
//!
//! let environment = fixtures::successful_environment().await;
//! let runner = MockProcessRunner::new();
//! let artifacts = MockArtifactStore::new();
//!
//! // Configure mock responses
//! runner.push(ScriptedRun::exit(1).with_stderr(["error CS1002: ; expected"])).await;
//! artifacts.set_url("https://store/my-plugin.btcpay").await;
//! ```

mod mock_artifact_store;
mod mock_build_environment;
mod mock_process_runner;

pub use mock_artifact_store::{MockArtifactStore, RecordedUpload};
pub use mock_build_environment::MockBuildEnvironment;
pub use mock_process_runner::{MockProcessRunner, ScriptedRun};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::time::Duration;

    use super::{MockBuildEnvironment, ScriptedRun};
    use crate::build::{BuildParameters, BUILD_DESCRIPTOR_FILE};

    pub const ASSEMBLY_NAME: &str = "MyPlugin";
    pub const DESCRIPTOR: &str = r#"{"assemblyName":"MyPlugin"}"#;
    pub const MANIFEST_FILE: &str = "MyPlugin.btcpay.json";
    pub const ARTIFACT_FILE: &str = "MyPlugin.btcpay";
    pub const MANIFEST: &str =
        r#"{"identifier":"my-plugin","version":[1,0,0],"btcPayMinVersion":[1,2,0]}"#;

    /// Parameters of a typical build request.
    pub fn build_parameters() -> BuildParameters {
        BuildParameters::new("https://github.com/example/my-plugin.git")
            .with_git_ref("main")
            .with_plugin_directory("Plugins/MyPlugin")
            .with_build_config("Release")
    }

    /// A manifest with the given identifier and version.
    pub fn manifest(identifier: &str, version: &str, min_host_version: &str) -> String {
        serde_json::json!({
            "identifier": identifier,
            "version": version,
            "btcPayMinVersion": min_host_version,
        })
        .to_string()
    }

    /// An environment whose workspaces contain a complete, valid build output.
    pub async fn successful_environment() -> MockBuildEnvironment {
        let environment = MockBuildEnvironment::new();
        environment.set_file(BUILD_DESCRIPTOR_FILE, DESCRIPTOR).await;
        environment.set_file(MANIFEST_FILE, MANIFEST).await;
        environment.set_file(ARTIFACT_FILE, "PK\u{3}\u{4}").await;
        environment
    }

    /// A compiler run printing a few typical lines.
    pub fn compiler_output() -> ScriptedRun {
        ScriptedRun::success()
            .with_stdout([
                "Cloning into '/source'...",
                "  Determining projects to restore...",
                "  MyPlugin -> /source/bin/Release/net8.0/MyPlugin.dll",
                "Build succeeded.",
            ])
            .with_stderr(["warning: detached HEAD"])
    }

    /// A build that runs until cancelled.
    pub fn slow_build() -> ScriptedRun {
        ScriptedRun::success().with_duration(Duration::from_secs(3600))
    }
}
