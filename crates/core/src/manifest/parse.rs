use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use super::version::PluginVersion;

/// Why a manifest document was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("manifest is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("manifest must be a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid {field}: {reason}")]
    InvalidVersion { field: &'static str, reason: String },
}

/// A validated plugin manifest.
///
/// `raw` keeps the whole document as the build produced it; it is what gets
/// persisted as the build's manifest info.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginManifest {
    pub identifier: String,
    pub name: Option<String>,
    pub version: PluginVersion,
    pub min_host_version: PluginVersion,
    #[serde(skip)]
    pub raw: Value,
}

impl PluginManifest {
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let raw: Value =
            serde_json::from_str(text.trim()).map_err(|e| ManifestError::InvalidJson(e.to_string()))?;
        let object = raw.as_object().ok_or(ManifestError::NotAnObject)?;

        let identifier = match field(object, "identifier") {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => {
                return Err(ManifestError::InvalidIdentifier(format!(
                    "expected a string, got {}",
                    other
                )))
            }
            None => return Err(ManifestError::MissingField("identifier")),
        };
        if identifier.is_empty() {
            return Err(ManifestError::InvalidIdentifier(
                "identifier is empty".to_string(),
            ));
        }
        if identifier.chars().any(char::is_whitespace) {
            warn!("Manifest identifier '{}' contains whitespace", identifier);
        }

        let version = required_version(object, "version")?;
        let min_host_version = required_version(object, "btcPayMinVersion")?;
        let name = field(object, "name")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            identifier,
            name,
            version,
            min_host_version,
            raw,
        })
    }

    pub fn to_json_string(&self) -> String {
        self.raw.to_string()
    }
}

/// Case-insensitive key lookup; manifests are written by hand and casing varies.
fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).or_else(|| {
        object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

fn required_version(
    object: &Map<String, Value>,
    name: &'static str,
) -> Result<PluginVersion, ManifestError> {
    let value = field(object, name).ok_or(ManifestError::MissingField(name))?;
    PluginVersion::from_json(value).map_err(|reason| ManifestError::InvalidVersion {
        field: name,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"identifier":"my-plugin","version":[1,0,0],"btcPayMinVersion":[1,2,0]}"#;

    #[test]
    fn test_identifier_with_whitespace_is_accepted() {
        let manifest = PluginManifest::parse(
            r#"{"identifier":" My Plugin ","version":"1.0","btcPayMinVersion":"1.2"}"#,
        )
        .unwrap();
        assert_eq!(manifest.identifier, "My Plugin");
    }

    #[test]
    fn test_parse_valid_manifest() {
        let manifest = PluginManifest::parse(VALID).unwrap();
        assert_eq!(manifest.identifier, "my-plugin");
        assert_eq!(manifest.version.to_string(), "1.0.0");
        assert_eq!(manifest.min_host_version.to_string(), "1.2.0");
        assert_eq!(manifest.name, None);
        assert_eq!(manifest.raw["version"], serde_json::json!([1, 0, 0]));
    }

    #[test]
    fn test_parse_pascal_case_and_strings() {
        let manifest = PluginManifest::parse(
            r#"{"Identifier":"BTCPayServer.Plugins.Test","Name":"Test","Version":"1.4.2","BTCPayMinVersion":"1.12.0"}"#,
        )
        .unwrap();
        assert_eq!(manifest.identifier, "BTCPayServer.Plugins.Test");
        assert_eq!(manifest.name.as_deref(), Some("Test"));
        assert_eq!(manifest.version.to_string(), "1.4.2");
        assert_eq!(manifest.min_host_version.to_string(), "1.12.0");
    }

    #[test]
    fn test_rejects_invalid_json() {
        assert!(matches!(
            PluginManifest::parse("{not json"),
            Err(ManifestError::InvalidJson(_))
        ));
        assert_eq!(
            PluginManifest::parse("[1,2]").unwrap_err(),
            ManifestError::NotAnObject
        );
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(
            PluginManifest::parse(r#"{"version":[1],"btcPayMinVersion":[1]}"#).unwrap_err(),
            ManifestError::MissingField("identifier")
        );
        assert_eq!(
            PluginManifest::parse(r#"{"identifier":"x","btcPayMinVersion":[1]}"#).unwrap_err(),
            ManifestError::MissingField("version")
        );
        assert_eq!(
            PluginManifest::parse(r#"{"identifier":"x","version":[1]}"#).unwrap_err(),
            ManifestError::MissingField("btcPayMinVersion")
        );
    }

    #[test]
    fn test_bad_identifier() {
        for text in [
            r#"{"identifier":"","version":[1],"btcPayMinVersion":[1]}"#,
            r#"{"identifier":"  ","version":[1],"btcPayMinVersion":[1]}"#,
            r#"{"identifier":42,"version":[1],"btcPayMinVersion":[1]}"#,
            r#"{"identifier":"a b","version":[1],"btcPayMinVersion":[1]}"#,
        ] {
            assert!(
                matches!(
                    PluginManifest::parse(text),
                    Err(ManifestError::InvalidIdentifier(_))
                ),
                "accepted {}",
                text
            );
        }
    }

    #[test]
    fn test_bad_versions() {
        let err = PluginManifest::parse(r#"{"identifier":"x","version":"one","btcPayMinVersion":[1]}"#)
            .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidVersion { field: "version", .. }));

        let err = PluginManifest::parse(r#"{"identifier":"x","version":[1],"btcPayMinVersion":{}}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ManifestError::InvalidVersion { field: "btcPayMinVersion", .. }
        ));
        assert!(err.to_string().starts_with("invalid btcPayMinVersion"));
    }
}
