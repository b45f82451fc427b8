//! Build orchestrator implementation.
//!
//! Drives one build through the pipeline:
//! provision -> run -> read descriptor and manifest -> upload -> register version.
//! Every transition is persisted first and then published on the event bus.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::build::{
    BuildDescriptor, BuildIdentity, BuildInfoPatch, BuildParameters, BuildState, PluginSlug,
    BUILD_DESCRIPTOR_FILE,
};
use crate::events::EventBus;
use crate::manifest::PluginManifest;
use crate::metrics::{
    BUILDS_FINISHED, BUILD_DURATION, BUILD_FAILURES, OWNERSHIP_MISMATCHES, SLOT_WAIT_DURATION,
    STATE_TRANSITIONS, VERSIONS_REGISTERED,
};
use crate::process::{
    cancel_pair, BuildLogCapture, CancelHandle, CancelSignal, OutputSink, ProcessOutcome,
    ProcessRunner,
};
use crate::storage::ArtifactStore;
use crate::store::{BuildStore, StoreError};
use crate::workspace::{BuildEnvironment, Workspace};

use super::config::OrchestratorConfig;
use super::gate::BuildGate;
use super::types::{BuildError, BuildOutcome, OrchestratorStatus, VersionRegistration};

/// Runs builds through the pipeline, at most `gate.capacity()` at a time.
pub struct BuildOrchestrator {
    config: OrchestratorConfig,
    gate: BuildGate,
    store: Arc<dyn BuildStore>,
    environment: Arc<dyn BuildEnvironment>,
    runner: Arc<dyn ProcessRunner>,
    artifacts: Arc<dyn ArtifactStore>,
    events: EventBus,

    // Builds started through `submit` that have not finished yet
    active: Arc<RwLock<HashMap<BuildIdentity, CancelHandle>>>,
}

impl BuildOrchestrator {
    pub fn new(
        gate: BuildGate,
        store: Arc<dyn BuildStore>,
        environment: Arc<dyn BuildEnvironment>,
        runner: Arc<dyn ProcessRunner>,
        artifacts: Arc<dyn ArtifactStore>,
        events: EventBus,
    ) -> Self {
        Self {
            config: OrchestratorConfig::default(),
            gate,
            store,
            environment,
            runner,
            artifacts,
            events,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn gate(&self) -> &BuildGate {
        &self.gate
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn BuildStore> {
        &self.store
    }

    /// Allocate a new build for `slug` and run it in the background.
    ///
    /// Returns as soon as the `Queued` record exists.
    pub async fn submit(
        self: &Arc<Self>,
        slug: &PluginSlug,
        parameters: &BuildParameters,
    ) -> Result<BuildIdentity, StoreError> {
        let identity = self.store.allocate_build(slug, parameters)?;
        STATE_TRANSITIONS
            .with_label_values(&[BuildState::Queued.as_str()])
            .inc();
        self.events.build_changed(
            &identity,
            BuildState::Queued,
            Some(parameters.to_patch().to_json_string()),
            None,
        );
        info!("Queued build {}", identity);

        let (handle, signal) = cancel_pair();
        self.active.write().await.insert(identity.clone(), handle);

        let this = Arc::clone(self);
        let spawned = identity.clone();
        tokio::spawn(async move {
            match this.run_build(&spawned, signal).await {
                Ok(outcome) => debug!("Build {} ended: {}", spawned, outcome.label()),
                Err(e) => debug!("Build {} ended with error: {}", spawned, e),
            }
            this.active.write().await.remove(&spawned);
        });

        Ok(identity)
    }

    /// Request cancellation of a build started with [`submit`](Self::submit).
    /// Returns false if the build is unknown or already finished.
    pub async fn cancel(&self, identity: &BuildIdentity) -> bool {
        match self.active.read().await.get(identity) {
            Some(handle) => {
                info!("Cancelling build {}", identity);
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every active build. Returns how many were signalled.
    pub async fn cancel_all(&self) -> usize {
        let active = self.active.read().await;
        for handle in active.values() {
            handle.cancel();
        }
        active.len()
    }

    /// Stop admitting builds and cancel the ones in flight.
    pub async fn shutdown(&self) -> usize {
        self.gate.close();
        let cancelled = self.cancel_all().await;
        info!("Orchestrator shut down, {} build(s) cancelled", cancelled);
        cancelled
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let mut active_builds: Vec<BuildIdentity> =
            self.active.read().await.keys().cloned().collect();
        active_builds.sort_by(|a, b| {
            (a.plugin_slug.as_str(), a.build_id).cmp(&(b.plugin_slug.as_str(), b.build_id))
        });

        OrchestratorStatus {
            capacity: self.gate.capacity(),
            in_use: self.gate.in_use(),
            available: self.gate.available(),
            closed: self.gate.is_closed(),
            active_builds,
        }
    }

    /// Run the whole pipeline for an already allocated build.
    ///
    /// Waits for a slot first. On a hard failure the build is left `Failed`
    /// with the returned error's message. On cancellation the build keeps its
    /// last persisted state.
    pub async fn run_build(
        &self,
        identity: &BuildIdentity,
        cancel: CancelSignal,
    ) -> Result<BuildOutcome, BuildError> {
        let wait_start = Instant::now();
        let slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            slot = self.gate.acquire() => slot.ok(),
        };
        let Some(slot) = slot else {
            return Ok(self.cancelled(identity, BuildState::Queued));
        };
        SLOT_WAIT_DURATION
            .with_label_values(&[])
            .observe(wait_start.elapsed().as_secs_f64());
        debug!(
            "Build {} acquired a slot ({}/{} in use)",
            identity,
            self.gate.in_use(),
            self.gate.capacity()
        );

        let started = Instant::now();
        let result = self.execute(identity, &cancel).await;
        drop(slot);

        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(_) => "failed",
        };
        BUILDS_FINISHED.with_label_values(&[label]).inc();
        BUILD_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());
        result
    }

    async fn execute(
        &self,
        identity: &BuildIdentity,
        cancel: &CancelSignal,
    ) -> Result<BuildOutcome, BuildError> {
        let parameters = match self.store.get_build_parameters(identity) {
            Ok(parameters) => parameters,
            Err(e) => return Err(self.fail(identity, e.into())),
        };

        if cancel.is_cancelled() {
            return Ok(self.cancelled(identity, BuildState::Queued));
        }

        let workspace = match self.environment.provision(identity).await {
            Ok(workspace) => workspace,
            Err(e) => return Err(self.fail(identity, BuildError::Provisioning(e.to_string()))),
        };

        let result = self
            .run_phases(identity, &workspace, &parameters, cancel)
            .await;

        if self.config.keep_workspaces {
            info!("Keeping workspace {} of build {}", workspace.name, identity);
        } else if let Err(e) = self.environment.dispose(&workspace).await {
            warn!(
                "Failed to dispose workspace {} of build {}: {}",
                workspace.name, identity, e
            );
        }

        result
    }

    async fn run_phases(
        &self,
        identity: &BuildIdentity,
        workspace: &Workspace,
        parameters: &BuildParameters,
        cancel: &CancelSignal,
    ) -> Result<BuildOutcome, BuildError> {
        if cancel.is_cancelled() {
            return Ok(self.cancelled(identity, BuildState::Queued));
        }

        let log = BuildLogCapture::new(identity.clone(), self.store.clone(), self.events.clone());

        // Running
        let running = parameters
            .to_patch()
            .with("dockerVolume", workspace.name.clone());
        if let Err(e) = self.transition(identity, BuildState::Running, Some(running), None) {
            return Err(self.fail(identity, e));
        }

        let command = self.environment.build_command(workspace, parameters);
        info!("Building {} with {}", identity, command.program);
        match self.runner.run(&command, &log, &log, cancel).await {
            Ok(ProcessOutcome::Exited { code: Some(0) }) => {
                debug!("Build {} produced {} log lines", identity, log.line_count());
            }
            Ok(ProcessOutcome::Cancelled) => {
                self.abort(workspace).await;
                return Ok(self.cancelled(identity, BuildState::Running));
            }
            Ok(outcome) => {
                return Err(self.fail(identity, BuildError::Execution(outcome.to_string())));
            }
            Err(e) => return Err(self.fail(identity, BuildError::Execution(e.to_string()))),
        }

        if cancel.is_cancelled() {
            return Ok(self.cancelled(identity, BuildState::Running));
        }

        // Descriptor and manifest
        let descriptor = match self.read_descriptor(workspace).await {
            Ok(descriptor) => descriptor,
            Err(e) => return Err(self.fail(identity, e)),
        };
        let manifest = match self.read_manifest(workspace, &descriptor).await {
            Ok(manifest) => manifest,
            Err(e) => return Err(self.fail(identity, e)),
        };
        if let Err(e) = self.transition(
            identity,
            BuildState::WaitingUpload,
            Some(descriptor.to_patch()),
            Some(&manifest),
        ) {
            return Err(self.fail(identity, e));
        }

        if cancel.is_cancelled() {
            return Ok(self.cancelled(identity, BuildState::WaitingUpload));
        }

        // Upload
        if let Err(e) = self.transition(identity, BuildState::Uploading, None, None) {
            return Err(self.fail(identity, e));
        }
        let url = match self.upload(identity, workspace, &descriptor).await {
            Ok(url) => url,
            Err(e) => return Err(self.fail(identity, e)),
        };
        let uploaded = BuildInfoPatch::new().with("url", url.clone());
        if let Err(e) = self.transition(identity, BuildState::Uploaded, Some(uploaded), None) {
            return Err(self.fail(identity, e));
        }

        let registration = self.finalize(identity, &manifest, &log);
        Ok(BuildOutcome::Uploaded { url, registration })
    }

    /// Stop whatever the cancelled build command left running.
    async fn abort(&self, workspace: &Workspace) {
        if let Err(e) = self.environment.abort(workspace).await {
            error!(
                "Failed to stop build {} in workspace {}: {}",
                workspace.identity, workspace.name, e
            );
        }
    }

    async fn read_descriptor(&self, workspace: &Workspace) -> Result<BuildDescriptor, BuildError> {
        let text = self
            .environment
            .read_file(workspace, BUILD_DESCRIPTOR_FILE)
            .await
            .map_err(|e| BuildError::ArtifactRead(e.to_string()))?;
        BuildDescriptor::parse(&text).map_err(|e| BuildError::ArtifactRead(e.to_string()))
    }

    async fn read_manifest(
        &self,
        workspace: &Workspace,
        descriptor: &BuildDescriptor,
    ) -> Result<PluginManifest, BuildError> {
        let text = self
            .environment
            .read_file(workspace, &descriptor.manifest_file_name())
            .await
            .map_err(|e| BuildError::ArtifactRead(e.to_string()))?;
        PluginManifest::parse(&text).map_err(|e| BuildError::MalformedManifest(e.to_string()))
    }

    async fn upload(
        &self,
        identity: &BuildIdentity,
        workspace: &Workspace,
        descriptor: &BuildDescriptor,
    ) -> Result<String, BuildError> {
        let artifact = descriptor.artifact_file_name();
        let local_dir = self
            .environment
            .export_file(workspace, &artifact)
            .await
            .map_err(|e| BuildError::Upload(e.to_string()))?;
        let destination = format!("{}/{}", identity, artifact);

        info!(
            "Uploading {} of build {} to {}",
            artifact,
            identity,
            self.artifacts.name()
        );
        self.artifacts
            .upload(&local_dir, &artifact, &destination)
            .await
            .map_err(|e| BuildError::Upload(e.to_string()))
    }

    /// Register the manifest's version if its identifier belongs to the
    /// build's plugin. Never fails the build; problems go to the build log.
    fn finalize(
        &self,
        identity: &BuildIdentity,
        manifest: &PluginManifest,
        log: &BuildLogCapture,
    ) -> VersionRegistration {
        let owned = match self
            .store
            .ensure_identifier_ownership(&identity.plugin_slug, &manifest.identifier)
        {
            Ok(owned) => owned,
            Err(e) => return self.skip_registration(identity, manifest, e, log),
        };

        if !owned {
            let mismatch = BuildError::OwnershipMismatch {
                identifier: manifest.identifier.clone(),
            };
            warn!("Build {}: {}", identity, mismatch);
            OWNERSHIP_MISMATCHES.inc();
            log.add_line(&mismatch.to_string());
            return VersionRegistration::OwnershipMismatch {
                identifier: manifest.identifier.clone(),
            };
        }

        match self.store.register_version(
            identity,
            &manifest.version,
            &manifest.min_host_version,
            self.config.register_as_pre_release,
        ) {
            Ok(()) => {
                VERSIONS_REGISTERED.inc();
                info!(
                    "Registered {} version {} from build {}",
                    manifest.identifier, manifest.version, identity
                );
                VersionRegistration::Registered {
                    version: manifest.version.clone(),
                }
            }
            Err(e) => self.skip_registration(identity, manifest, e, log),
        }
    }

    fn skip_registration(
        &self,
        identity: &BuildIdentity,
        manifest: &PluginManifest,
        error: StoreError,
        log: &BuildLogCapture,
    ) -> VersionRegistration {
        let reason = format!("Failed to register version {}: {}", manifest.version, error);
        warn!("Build {}: {}", identity, reason);
        log.add_line(&reason);
        VersionRegistration::Skipped { reason }
    }

    /// Persist a state change, then publish it.
    fn transition(
        &self,
        identity: &BuildIdentity,
        state: BuildState,
        build_info: Option<BuildInfoPatch>,
        manifest: Option<&PluginManifest>,
    ) -> Result<(), BuildError> {
        self.store
            .update_build(identity, state, build_info.as_ref(), manifest.map(|m| &m.raw))?;

        info!("Build {} is now {}", identity, state);
        STATE_TRANSITIONS.with_label_values(&[state.as_str()]).inc();
        self.events.build_changed(
            identity,
            state,
            build_info.map(|patch| patch.to_json_string()),
            manifest.map(PluginManifest::to_json_string),
        );
        Ok(())
    }

    /// Record a hard failure and hand the error back for propagation.
    fn fail(&self, identity: &BuildIdentity, error: BuildError) -> BuildError {
        error!("Build {} failed during {}: {}", identity, error.phase(), error);
        BUILD_FAILURES.with_label_values(&[error.phase()]).inc();

        let patch = BuildInfoPatch::failure(error.to_string());
        if let Err(e) = self.transition(identity, BuildState::Failed, Some(patch), None) {
            error!("Could not record failure of build {}: {}", identity, e);
        }
        error
    }

    fn cancelled(&self, identity: &BuildIdentity, last_state: BuildState) -> BuildOutcome {
        info!("Build {} cancelled while {}", identity, last_state);
        BuildOutcome::Cancelled { last_state }
    }
}
