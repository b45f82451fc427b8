//! Typed patch operation for the build metadata document.
//!
//! The persisted `buildInfo` document is an open key/value object. Every write
//! against it is a [`BuildInfoPatch`]: a shallow, key-wise union where keys in
//! the patch overwrite same-named keys and absent keys are preserved.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The persisted, schemaless build metadata document.
pub type BuildInfo = Map<String, Value>;

/// Key carrying the human-readable message of a failed build.
pub const ERROR_KEY: &str = "error";

/// A set of key/value additions applied to a stored [`BuildInfo`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildInfoPatch {
    entries: BuildInfo,
}

impl BuildInfoPatch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the patch written with a `Failed` transition.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new().with(ERROR_KEY, message.into())
    }

    /// Wraps an arbitrary JSON value, if it is an object.
    pub fn from_object(value: Value) -> Option<Self> {
        match value {
            Value::Object(entries) => Some(Self { entries }),
            _ => None,
        }
    }

    /// Adds or replaces a key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds a key only when a value is present.
    pub fn with_opt<V: Into<Value>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    /// Adds or replaces a key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// The failure message carried by this patch, if any.
    pub fn error(&self) -> Option<&str> {
        self.entries.get(ERROR_KEY).and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &BuildInfo {
        &self.entries
    }

    /// Applies this patch to a stored document.
    pub fn apply_to(&self, document: &mut BuildInfo) {
        for (key, value) in &self.entries {
            document.insert(key.clone(), value.clone());
        }
    }

    /// Composes two patches so that applying the result equals applying
    /// `self` followed by `later`.
    pub fn merged_with(mut self, later: &BuildInfoPatch) -> Self {
        later.apply_to(&mut self.entries);
        self
    }

    pub fn to_json_string(&self) -> String {
        Value::Object(self.entries.clone()).to_string()
    }
}

impl From<BuildInfo> for BuildInfoPatch {
    fn from(entries: BuildInfo) -> Self {
        Self { entries }
    }
}
