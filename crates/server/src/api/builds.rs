//! Build API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use plugin_builder_core::{
    BuildIdentity, BuildInfo, BuildLogLine, BuildParameters, BuildRecord, BuildState, PluginSlug,
};

use super::error::ApiError;
use crate::state::AppState;

/// Maximum allowed limit for build queries
const MAX_LIMIT: usize = 500;

/// Default limit for build queries
const DEFAULT_LIMIT: usize = 50;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a build
#[derive(Debug, Deserialize)]
pub struct CreateBuildBody {
    /// Repository to clone
    pub git_repository: String,
    /// Branch, tag or commit to check out
    pub git_ref: Option<String>,
    /// Directory of the plugin project inside the repository
    pub plugin_directory: Option<String>,
    /// Build configuration (e.g. "Release")
    pub build_config: Option<String>,
}

impl CreateBuildBody {
    fn into_parameters(self) -> Result<BuildParameters, ApiError> {
        let git_repository = self.git_repository.trim();
        if git_repository.is_empty() {
            return Err(ApiError::bad_request("git_repository cannot be empty"));
        }

        let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        Ok(BuildParameters {
            git_repository: git_repository.to_string(),
            git_ref: non_blank(self.git_ref),
            plugin_directory: non_blank(self.plugin_directory),
            build_config: non_blank(self.build_config),
        })
    }
}

/// Response for a newly queued build
#[derive(Debug, Serialize)]
pub struct CreateBuildResponse {
    pub plugin_slug: String,
    pub build_id: i64,
}

/// Query parameters for listing builds
#[derive(Debug, Deserialize)]
pub struct ListBuildsParams {
    /// Maximum number of builds to return
    pub limit: Option<usize>,
}

/// Response for build operations
#[derive(Debug, Serialize)]
pub struct BuildResponse {
    pub plugin_slug: String,
    pub build_id: i64,
    pub state: BuildState,
    pub build_info: BuildInfo,
    pub manifest_info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<BuildRecord> for BuildResponse {
    fn from(record: BuildRecord) -> Self {
        Self {
            error: record.error().map(String::from),
            url: record.url().map(String::from),
            plugin_slug: record.identity.plugin_slug.to_string(),
            build_id: record.identity.build_id,
            state: record.state,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
            build_info: record.build_info,
            manifest_info: record.manifest_info,
        }
    }
}

/// Response for listing builds
#[derive(Debug, Serialize)]
pub struct ListBuildsResponse {
    pub builds: Vec<BuildResponse>,
    pub limit: usize,
}

/// Response for a build's log
#[derive(Debug, Serialize)]
pub struct BuildLogsResponse {
    pub plugin_slug: String,
    pub build_id: i64,
    pub lines: Vec<BuildLogLine>,
}

/// Simple message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Queue a new build of a plugin
pub async fn create_build(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(body): Json<CreateBuildBody>,
) -> Result<(StatusCode, Json<CreateBuildResponse>), ApiError> {
    let slug = PluginSlug::new(slug)?;
    let parameters = body.into_parameters()?;

    let identity = state.orchestrator().submit(&slug, &parameters).await?;
    info!(
        "Build {} requested for {}",
        identity, parameters.git_repository
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateBuildResponse {
            plugin_slug: identity.plugin_slug.to_string(),
            build_id: identity.build_id,
        }),
    ))
}

/// List the most recent builds of a plugin
pub async fn list_builds(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(params): Query<ListBuildsParams>,
) -> Result<Json<ListBuildsResponse>, ApiError> {
    let slug = PluginSlug::new(slug)?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let builds = state.store().list_builds(&slug, limit)?;
    Ok(Json(ListBuildsResponse {
        builds: builds.into_iter().map(BuildResponse::from).collect(),
        limit,
    }))
}

/// Get one build
pub async fn get_build(
    State(state): State<Arc<AppState>>,
    Path((slug, build_id)): Path<(String, i64)>,
) -> Result<Json<BuildResponse>, ApiError> {
    let identity = BuildIdentity::new(PluginSlug::new(slug)?, build_id);
    let record = state.store().get_build(&identity)?;
    Ok(Json(BuildResponse::from(record)))
}

/// Get the persisted log of a build
pub async fn get_build_logs(
    State(state): State<Arc<AppState>>,
    Path((slug, build_id)): Path<(String, i64)>,
) -> Result<Json<BuildLogsResponse>, ApiError> {
    let identity = BuildIdentity::new(PluginSlug::new(slug)?, build_id);

    // Unknown builds are a 404, not an empty log
    state.store().get_build(&identity)?;
    let lines = state.store().get_logs(&identity)?;

    Ok(Json(BuildLogsResponse {
        plugin_slug: identity.plugin_slug.to_string(),
        build_id: identity.build_id,
        lines,
    }))
}

/// Cancel a build that is queued or in progress
pub async fn cancel_build(
    State(state): State<Arc<AppState>>,
    Path((slug, build_id)): Path<(String, i64)>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let identity = BuildIdentity::new(PluginSlug::new(slug)?, build_id);

    if state.orchestrator().cancel(&identity).await {
        return Ok((
            StatusCode::ACCEPTED,
            Json(MessageResponse {
                message: format!("Cancellation of build {} requested", identity),
            }),
        ));
    }

    let record = state.store().get_build(&identity)?;
    Err(ApiError::conflict(format!(
        "Build {} is not in progress (state: {})",
        identity, record.state
    )))
}
