//! Durable build metadata: records, logs, identifier ownership and versions.

mod error;
mod sqlite;
mod types;

pub use error::StoreError;
pub use sqlite::SqliteBuildStore;
pub use types::PublishedVersion;

use serde_json::Value;

use crate::build::{
    BuildIdentity, BuildInfoPatch, BuildLogLine, BuildParameters, BuildRecord, BuildState,
    PluginSlug,
};
use crate::manifest::PluginVersion;

/// Persistence required by the build orchestrator and the API.
///
/// Every method is a single atomic operation. Implementations must be safe to
/// call from many concurrent builds.
pub trait BuildStore: Send + Sync {
    /// Allocate the next build number for `slug` and insert a `Queued` record
    /// whose buildInfo holds `parameters`. Numbers start at 0 and are never
    /// reused.
    fn allocate_build(
        &self,
        slug: &PluginSlug,
        parameters: &BuildParameters,
    ) -> Result<BuildIdentity, StoreError>;

    fn get_build(&self, identity: &BuildIdentity) -> Result<BuildRecord, StoreError>;

    /// Most recent builds of a plugin, newest first.
    fn list_builds(&self, slug: &PluginSlug, limit: usize) -> Result<Vec<BuildRecord>, StoreError>;

    /// The request parameters recorded when the build was allocated.
    fn get_build_parameters(&self, identity: &BuildIdentity)
        -> Result<BuildParameters, StoreError>;

    /// Set the state, shallow-merge `build_info` into the stored document and
    /// replace the manifest when one is given.
    ///
    /// A `Failed` update must carry a non-empty `error`.
    fn update_build(
        &self,
        identity: &BuildIdentity,
        state: BuildState,
        build_info: Option<&BuildInfoPatch>,
        manifest_info: Option<&Value>,
    ) -> Result<(), StoreError>;

    fn append_log(&self, identity: &BuildIdentity, line: &str) -> Result<(), StoreError>;

    fn get_logs(&self, identity: &BuildIdentity) -> Result<Vec<BuildLogLine>, StoreError>;

    /// Whether `identifier` belongs to `slug`. An unclaimed identifier is
    /// claimed by the caller.
    fn ensure_identifier_ownership(
        &self,
        slug: &PluginSlug,
        identifier: &str,
    ) -> Result<bool, StoreError>;

    /// Make `identity` the current build of `version`.
    fn register_version(
        &self,
        identity: &BuildIdentity,
        version: &PluginVersion,
        min_host_version: &PluginVersion,
        pre_release: bool,
    ) -> Result<(), StoreError>;

    /// Registered versions of one plugin, highest first.
    fn list_versions(&self, slug: &PluginSlug) -> Result<Vec<PublishedVersion>, StoreError>;

    /// Highest registered version of every plugin, optionally restricted to
    /// versions loadable by `host_version`.
    fn latest_versions(
        &self,
        host_version: Option<&PluginVersion>,
        include_pre_release: bool,
    ) -> Result<Vec<PublishedVersion>, StoreError>;
}
