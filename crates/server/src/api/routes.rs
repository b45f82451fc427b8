use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use super::{builds, handlers, middleware::metrics_middleware, versions, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and slot status
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/status", get(handlers::get_status))
        // Builds
        .route(
            "/plugins/{slug}/builds",
            post(builds::create_build).get(builds::list_builds),
        )
        .route("/plugins/{slug}/builds/{build_id}", get(builds::get_build))
        .route(
            "/plugins/{slug}/builds/{build_id}/logs",
            get(builds::get_build_logs),
        )
        .route(
            "/plugins/{slug}/builds/{build_id}/cancel",
            post(builds::cancel_build),
        )
        // Published versions
        .route(
            "/plugins/{slug}/versions",
            get(versions::list_plugin_versions),
        )
        .route("/versions", get(versions::latest_versions))
        // Live build events
        .route("/ws", get(ws::ws_handler));

    // Uploaded artifacts, as written by the file system artifact store
    let artifacts = ServeDir::new(&state.config().storage.root);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .nest_service("/artifacts", artifacts)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(metrics_middleware)),
        )
        .with_state(state)
}
