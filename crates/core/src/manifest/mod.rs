//! Plugin manifest parsing and validation.

mod parse;
mod version;

pub use parse::{ManifestError, PluginManifest};
pub use version::PluginVersion;
