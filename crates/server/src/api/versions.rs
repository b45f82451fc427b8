//! Published version API handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use plugin_builder_core::{PluginSlug, PluginVersion, PublishedVersion};

use super::error::ApiError;
use crate::state::AppState;

/// Query parameters for the latest versions of every plugin
#[derive(Debug, Deserialize)]
pub struct LatestVersionsParams {
    /// Only versions loadable by this host version (e.g. "1.12.0")
    pub host_version: Option<String>,
    /// Include versions registered as pre-releases
    #[serde(default)]
    pub include_pre_release: bool,
}

/// Response for one plugin's versions
#[derive(Debug, Serialize)]
pub struct PluginVersionsResponse {
    pub plugin_slug: String,
    pub versions: Vec<PublishedVersion>,
}

/// Response for the latest versions of every plugin
#[derive(Debug, Serialize)]
pub struct LatestVersionsResponse {
    pub versions: Vec<PublishedVersion>,
}

/// List the registered versions of a plugin, highest first
pub async fn list_plugin_versions(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<PluginVersionsResponse>, ApiError> {
    let slug = PluginSlug::new(slug)?;
    let versions = state.store().list_versions(&slug)?;
    Ok(Json(PluginVersionsResponse {
        plugin_slug: slug.to_string(),
        versions,
    }))
}

/// Highest version of every plugin
pub async fn latest_versions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LatestVersionsParams>,
) -> Result<Json<LatestVersionsResponse>, ApiError> {
    let host_version = params
        .host_version
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
            v.parse::<PluginVersion>()
                .map_err(|e| ApiError::bad_request(format!("Invalid host_version: {}", e)))
        })
        .transpose()?;

    let versions = state
        .store()
        .latest_versions(host_version.as_ref(), params.include_pre_release)?;
    Ok(Json(LatestVersionsResponse { versions }))
}
