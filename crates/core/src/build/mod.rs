//! Build identity, state machine and the merge-on-write build metadata document.

mod patch;
mod types;

pub use patch::{BuildInfo, BuildInfoPatch, ERROR_KEY};
pub use types::{
    BuildDescriptor, BuildIdentity, BuildLogLine, BuildParameters, BuildRecord, BuildState,
    DescriptorError, PluginSlug, SlugError, BUILD_DESCRIPTOR_FILE,
};
