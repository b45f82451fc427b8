//! Build orchestrator.
//!
//! Sequences the build pipeline and owns admission control:
//! - **Gate**: a fixed pool of slots; a build holds one for its whole pipeline
//! - **Pipeline**: phases run strictly in order, each transition persisted then published
//! - **Failure**: any hard failure marks the build `Failed` and stops it

mod config;
mod gate;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use gate::{BuildGate, BuildSlot, GateClosed};
pub use runner::BuildOrchestrator;
pub use types::{BuildError, BuildOutcome, OrchestratorStatus, VersionRegistration};
