//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock build collaborators injected, so the HTTP surface can be
//! exercised without Docker.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use plugin_builder_core::{
    config::DatabaseConfig,
    testing::{MockArtifactStore, MockBuildEnvironment, MockProcessRunner},
    BuildGate, BuildOrchestrator, Config, EventBus, OrchestratorConfig, SqliteBuildStore,
    StorageConfig,
};
use plugin_builder_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use plugin_builder_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_build_creation() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/plugins/my-plugin/builds", json!({
///         "git_repository": "https://github.com/example/my-plugin.git"
///     })).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Orchestrator behind the router
    pub orchestrator: Arc<BuildOrchestrator>,
    /// Mock build environment - configure build outputs
    pub environment: Arc<MockBuildEnvironment>,
    /// Mock process runner - script compiler runs
    pub runner: Arc<MockProcessRunner>,
    /// Mock artifact store - observe uploads
    pub artifacts: Arc<MockArtifactStore>,
    /// Temporary directory for test database and artifacts
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture whose builds succeed.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            database: DatabaseConfig { path: db_path },
            storage: StorageConfig::default().with_root(temp_dir.path().join("artifacts")),
            orchestrator: OrchestratorConfig {
                max_concurrent_builds: 2,
                ..Default::default()
            },
            ..Default::default()
        };

        let store = Arc::new(
            SqliteBuildStore::new(&config.database.path).expect("Failed to create build store"),
        );
        let environment = Arc::new(fixtures::successful_environment().await);
        let runner = Arc::new(MockProcessRunner::new());
        let artifacts = Arc::new(MockArtifactStore::new());

        let orchestrator = Arc::new(
            BuildOrchestrator::new(
                BuildGate::new(config.orchestrator.max_concurrent_builds),
                store,
                environment.clone(),
                runner.clone(),
                artifacts.clone(),
                EventBus::new(config.orchestrator.event_buffer_size),
            )
            .with_config(config.orchestrator.clone()),
        );

        let state = Arc::new(AppState::new(config, Arc::clone(&orchestrator)));
        let router = create_router(state);

        Self {
            router,
            orchestrator,
            environment,
            runner,
            artifacts,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Poll a build until it reaches `state` or the timeout expires.
    pub async fn wait_for_state(&self, slug: &str, build_id: i64, state: &str) -> TestResponse {
        let path = format!("/api/v1/plugins/{}/builds/{}", slug, build_id);
        for _ in 0..200 {
            let response = self.get(&path).await;
            if response.body["state"] == state {
                return response;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Build {}/{} never reached state {}", slug, build_id, state);
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into()))
        };

        TestResponse { status, body }
    }
}
