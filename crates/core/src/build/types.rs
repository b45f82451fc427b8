//! Core build types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::patch::{BuildInfo, BuildInfoPatch, ERROR_KEY};

/// Name of the descriptor the builder image writes next to the artifact.
pub const BUILD_DESCRIPTOR_FILE: &str = "build-env.json";

static SLUG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,48}[a-z0-9]$").expect("valid slug regex"));

/// Error returned when a plugin slug fails validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid plugin slug '{0}': expected 3-50 lowercase letters, digits or dashes")]
pub struct SlugError(pub String);

/// URL-safe, immutable identifier of a plugin project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PluginSlug(String);

impl PluginSlug {
    pub fn new(slug: impl Into<String>) -> Result<Self, SlugError> {
        let slug = slug.into();
        if SLUG_PATTERN.is_match(&slug) {
            Ok(Self(slug))
        } else {
            Err(SlugError(slug))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PluginSlug {
    type Err = SlugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PluginSlug {
    type Error = SlugError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PluginSlug> for String {
    fn from(slug: PluginSlug) -> Self {
        slug.0
    }
}

impl AsRef<str> for PluginSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One build attempt: a plugin slug plus its per-plugin build number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildIdentity {
    pub plugin_slug: PluginSlug,
    pub build_id: i64,
}

impl BuildIdentity {
    pub fn new(plugin_slug: PluginSlug, build_id: i64) -> Self {
        Self {
            plugin_slug,
            build_id,
        }
    }
}

impl fmt::Display for BuildIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.plugin_slug, self.build_id)
    }
}

/// Build state machine.
///
/// ```text
/// Queued -> Running -> WaitingUpload -> Uploading -> Uploaded
///    \         \             \              \
///     +---------+-------------+--------------+--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Queued,
    Running,
    WaitingUpload,
    Uploading,
    Uploaded,
    Failed,
}

impl BuildState {
    pub const ALL: [BuildState; 6] = [
        BuildState::Queued,
        BuildState::Running,
        BuildState::WaitingUpload,
        BuildState::Uploading,
        BuildState::Uploaded,
        BuildState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildState::Queued => "queued",
            BuildState::Running => "running",
            BuildState::WaitingUpload => "waiting_upload",
            BuildState::Uploading => "uploading",
            BuildState::Uploaded => "uploaded",
            BuildState::Failed => "failed",
        }
    }

    /// Whether the orchestrator is done with a build in this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Uploaded | BuildState::Failed)
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuildState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("Unknown build state: {}", s))
    }
}

/// Parameters of a build request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildParameters {
    /// Git repository to clone.
    pub git_repository: String,
    /// Branch, tag or commit to check out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Directory of the plugin project inside the repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_directory: Option<String>,
    /// Build configuration name (e.g. "Release").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_config: Option<String>,
}

impl BuildParameters {
    pub fn new(git_repository: impl Into<String>) -> Self {
        Self {
            git_repository: git_repository.into(),
            git_ref: None,
            plugin_directory: None,
            build_config: None,
        }
    }

    pub fn with_git_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    pub fn with_plugin_directory(mut self, dir: impl Into<String>) -> Self {
        self.plugin_directory = Some(dir.into());
        self
    }

    pub fn with_build_config(mut self, config: impl Into<String>) -> Self {
        self.build_config = Some(config.into());
        self
    }

    /// The buildInfo entries describing these parameters.
    pub fn to_patch(&self) -> BuildInfoPatch {
        BuildInfoPatch::new()
            .with("gitRepository", self.git_repository.clone())
            .with_opt("gitRef", self.git_ref.clone())
            .with_opt("pluginDir", self.plugin_directory.clone())
            .with_opt("buildConfig", self.build_config.clone())
    }

    /// Reads parameters back from a stored buildInfo document.
    pub fn from_build_info(info: &BuildInfo) -> Option<Self> {
        let text = |key: &str| info.get(key).and_then(Value::as_str).map(String::from);
        let git_repository = text("gitRepository").filter(|r| !r.trim().is_empty())?;
        Some(Self {
            git_repository,
            git_ref: text("gitRef"),
            plugin_directory: text("pluginDir"),
            build_config: text("buildConfig"),
        })
    }
}

/// Error parsing the build descriptor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("{file} is not a valid JSON object: {reason}")]
    InvalidJson { file: &'static str, reason: String },

    #[error("{file} does not declare an assemblyName")]
    MissingAssemblyName { file: &'static str },
}

/// Descriptor written by the builder image (`build-env.json`).
#[derive(Debug, Clone, PartialEq)]
pub struct BuildDescriptor {
    pub assembly_name: String,
    /// Every field of the descriptor, merged into buildInfo as-is.
    pub raw: BuildInfo,
}

impl BuildDescriptor {
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let value: Value =
            serde_json::from_str(text.trim()).map_err(|e| DescriptorError::InvalidJson {
                file: BUILD_DESCRIPTOR_FILE,
                reason: e.to_string(),
            })?;
        let Value::Object(raw) = value else {
            return Err(DescriptorError::InvalidJson {
                file: BUILD_DESCRIPTOR_FILE,
                reason: "expected an object".to_string(),
            });
        };
        let assembly_name = raw
            .get("assemblyName")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(DescriptorError::MissingAssemblyName {
                file: BUILD_DESCRIPTOR_FILE,
            })?
            .to_string();
        Ok(Self { assembly_name, raw })
    }

    /// File name of the packaged plugin.
    pub fn artifact_file_name(&self) -> String {
        format!("{}.btcpay", self.assembly_name)
    }

    /// File name of the plugin manifest.
    pub fn manifest_file_name(&self) -> String {
        format!("{}.btcpay.json", self.assembly_name)
    }

    pub fn to_patch(&self) -> BuildInfoPatch {
        BuildInfoPatch::from(self.raw.clone())
    }
}

/// A persisted build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildRecord {
    pub identity: BuildIdentity,
    pub state: BuildState,
    pub build_info: BuildInfo,
    pub manifest_info: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BuildRecord {
    /// Failure message of a failed build.
    pub fn error(&self) -> Option<&str> {
        self.build_info.get(ERROR_KEY).and_then(Value::as_str)
    }

    /// Download URL of an uploaded artifact.
    pub fn url(&self) -> Option<&str> {
        self.build_info.get("url").and_then(Value::as_str)
    }
}

/// One timestamped line of a build's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildLogLine {
    pub timestamp: DateTime<Utc>,
    pub line: String,
}
