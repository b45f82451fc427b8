use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::build::{BuildIdentity, BuildInfo, PluginSlug};
use crate::manifest::PluginVersion;

/// A registered plugin version and the build that currently backs it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedVersion {
    pub plugin_slug: PluginSlug,
    pub version: PluginVersion,
    pub build_id: i64,
    pub min_host_version: PluginVersion,
    pub pre_release: bool,
    pub updated_at: DateTime<Utc>,
    pub build_info: BuildInfo,
    pub manifest_info: Option<Value>,
}

impl PublishedVersion {
    pub fn identity(&self) -> BuildIdentity {
        BuildIdentity::new(self.plugin_slug.clone(), self.build_id)
    }

    /// Whether a host running `host_version` can load this version.
    pub fn supports_host(&self, host_version: &PluginVersion) -> bool {
        &self.min_host_version <= host_version
    }
}
