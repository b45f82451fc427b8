pub mod build;
pub mod config;
pub mod events;
pub mod manifest;
pub mod metrics;
pub mod orchestrator;
pub mod process;
pub mod storage;
pub mod store;
pub mod testing;
pub mod workspace;

pub use build::{
    BuildDescriptor, BuildIdentity, BuildInfo, BuildInfoPatch, BuildLogLine, BuildParameters,
    BuildRecord, BuildState, PluginSlug, SlugError,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use events::{BuildEvent, EventBus, EventKind, EventSubscription};
pub use manifest::{ManifestError, PluginManifest, PluginVersion};
pub use orchestrator::{
    BuildError, BuildGate, BuildOrchestrator, BuildOutcome, OrchestratorConfig,
    OrchestratorStatus, VersionRegistration,
};
pub use process::{
    cancel_pair, CancelHandle, CancelSignal, ProcessError, ProcessOutcome, ProcessRunner,
    ProcessSpec, TokioProcessRunner,
};
pub use storage::{ArtifactStore, FsArtifactStore, StorageConfig, StorageError};
pub use store::{BuildStore, PublishedVersion, SqliteBuildStore, StoreError};
pub use workspace::{BuildEnvironment, DockerConfig, DockerEnvironment, Workspace, WorkspaceError};
