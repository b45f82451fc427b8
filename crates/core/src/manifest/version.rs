use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

const MAX_COMPONENTS: usize = 4;

/// Dotted numeric version such as `1.2.0`.
///
/// Compared component-wise with missing trailing components treated as
/// zero, so `1.2` and `1.2.0` are equal.
#[derive(Debug, Clone)]
pub struct PluginVersion(Vec<u32>);

impl PluginVersion {
    pub fn new(components: Vec<u32>) -> Result<Self, String> {
        if components.is_empty() {
            return Err("version has no components".to_string());
        }
        if components.len() > MAX_COMPONENTS {
            return Err(format!(
                "version has {} components, at most {} allowed",
                components.len(),
                MAX_COMPONENTS
            ));
        }
        Ok(Self(components))
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// Parse either a JSON array of integers (`[1,0,0]`) or a dotted string.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(s) => s.parse(),
            Value::Array(items) => {
                let components = items
                    .iter()
                    .map(|item| {
                        item.as_u64()
                            .and_then(|n| u32::try_from(n).ok())
                            .ok_or_else(|| format!("'{}' is not a version component", item))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::new(components)
            }
            other => Err(format!("expected an array or a string, got {}", other)),
        }
    }

    /// Storage key shared by all spellings of one version: `1.2` and
    /// `1.2.0` both become `1.2.0.0`.
    pub fn canonical_key(&self) -> String {
        (0..MAX_COMPONENTS)
            .map(|i| self.0.get(i).copied().unwrap_or(0).to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    fn significant(&self) -> &[u32] {
        let end = self
            .0
            .iter()
            .rposition(|c| *c != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.0[..end]
    }
}

impl FromStr for PluginVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("version is empty".to_string());
        }
        let components = s
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| format!("'{}' is not a version component", part))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(components)
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl Ord for PluginVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for PluginVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PluginVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PluginVersion {}

impl Hash for PluginVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl Serialize for PluginVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PluginVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}
