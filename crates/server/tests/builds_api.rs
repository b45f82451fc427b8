//! HTTP API tests with mocked build collaborators.
//!
//! These tests run the full router in-process; builds go through the real
//! orchestrator and SQLite store with a mocked sandbox and artifact store.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use plugin_builder_core::testing::ScriptedRun;

use common::{fixtures, TestFixture};

fn build_request() -> serde_json::Value {
    json!({
        "git_repository": "https://github.com/example/my-plugin.git",
        "git_ref": "main",
        "plugin_directory": "Plugins/MyPlugin",
        "build_config": "Release"
    })
}

// =============================================================================
// Basic API Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_endpoint_is_sanitized() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["docker"]["image"], "plugin-builder");
    assert_eq!(response.body["orchestrator"]["max_concurrent_builds"], 2);
    assert!(response.body.get("database").is_none());
    assert!(response.body["storage"].get("root").is_none());
}

#[tokio::test]
async fn test_status_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/status").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["capacity"], 2);
    assert_eq!(response.body["in_use"], 0);
    assert_eq!(response.body["closed"], false);
    assert_eq!(response.body["active_builds"], json!([]));
}

// =============================================================================
// Builds
// =============================================================================

#[tokio::test]
async fn test_create_build_runs_to_upload() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/plugins/my-plugin/builds", build_request())
        .await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["plugin_slug"], "my-plugin");
    assert_eq!(response.body["build_id"], 0);

    let build = fixture.wait_for_state("my-plugin", 0, "uploaded").await;
    assert_eq!(build.status, StatusCode::OK);
    assert_eq!(
        build.body["url"],
        "https://store/my-plugin/0/MyPlugin.btcpay"
    );
    assert_eq!(build.body["build_info"]["gitRef"], "main");
    assert_eq!(build.body["build_info"]["assemblyName"], "MyPlugin");
    assert_eq!(build.body["manifest_info"]["identifier"], "my-plugin");
    assert!(build.body.get("error").is_none());
    assert_eq!(fixture.artifacts.upload_count().await, 1);
}

#[tokio::test]
async fn test_build_numbers_increase_per_plugin() {
    let fixture = TestFixture::new().await;

    let first = fixture
        .post("/api/v1/plugins/my-plugin/builds", build_request())
        .await;
    let second = fixture
        .post("/api/v1/plugins/my-plugin/builds", build_request())
        .await;
    let other = fixture
        .post("/api/v1/plugins/other-plugin/builds", build_request())
        .await;

    assert_eq!(first.body["build_id"], 0);
    assert_eq!(second.body["build_id"], 1);
    assert_eq!(other.body["build_id"], 0);
}

#[tokio::test]
async fn test_create_build_with_invalid_slug() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/plugins/My_Plugin/builds", build_request())
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_create_build_without_repository() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/plugins/my-plugin/builds",
            json!({ "git_repository": "  " }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "git_repository cannot be empty");
    assert_eq!(fixture.runner.run_count().await, 0);
}

#[tokio::test]
async fn test_create_build_with_malformed_json() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_raw("/api/v1/plugins/my-plugin/builds", "{not json")
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_unknown_build() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/plugins/my-plugin/builds/42").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_get_build_with_non_numeric_id() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/plugins/my-plugin/builds/latest").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_builds_newest_first() {
    let fixture = TestFixture::new().await;
    for _ in 0..3 {
        fixture
            .post("/api/v1/plugins/my-plugin/builds", build_request())
            .await;
    }
    for id in 0..3 {
        fixture.wait_for_state("my-plugin", id, "uploaded").await;
    }

    let response = fixture
        .get("/api/v1/plugins/my-plugin/builds?limit=2")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["limit"], 2);
    let builds = response.body["builds"].as_array().unwrap();
    assert_eq!(builds.len(), 2);
    assert_eq!(builds[0]["build_id"], 2);
    assert_eq!(builds[1]["build_id"], 1);
}

#[tokio::test]
async fn test_failed_build_reports_error() {
    let fixture = TestFixture::new().await;
    fixture
        .runner
        .push(ScriptedRun::exit(1).with_stderr(["error CS0246: type not found"]))
        .await;

    fixture
        .post("/api/v1/plugins/my-plugin/builds", build_request())
        .await;
    let build = fixture.wait_for_state("my-plugin", 0, "failed").await;

    assert!(build.body["error"]
        .as_str()
        .unwrap()
        .starts_with("Build failed"));
    assert!(build.body.get("url").is_none());

    let logs = fixture.get("/api/v1/plugins/my-plugin/builds/0/logs").await;
    assert_eq!(logs.status, StatusCode::OK);
    assert_eq!(
        logs.body["lines"][0]["line"],
        "error CS0246: type not found"
    );
}

#[tokio::test]
async fn test_build_logs_in_order() {
    let fixture = TestFixture::new().await;
    fixture.runner.push(fixtures::compiler_output()).await;

    fixture
        .post("/api/v1/plugins/my-plugin/builds", build_request())
        .await;
    fixture.wait_for_state("my-plugin", 0, "uploaded").await;

    let response = fixture.get("/api/v1/plugins/my-plugin/builds/0/logs").await;

    assert_eq!(response.status, StatusCode::OK);
    let lines: Vec<&str> = response.body["lines"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["line"].as_str().unwrap())
        .collect();
    assert_eq!(lines.first(), Some(&"Cloning into '/source'..."));
    assert_eq!(lines.last(), Some(&"warning: detached HEAD"));
    assert_eq!(lines.len(), 5);
    assert!(response.body["lines"][0]["timestamp"].is_string());
}

#[tokio::test]
async fn test_logs_of_unknown_build() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/plugins/my-plugin/builds/7/logs").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_running_build() {
    let fixture = TestFixture::new().await;
    fixture.runner.set_default(fixtures::slow_build()).await;

    fixture
        .post("/api/v1/plugins/my-plugin/builds", build_request())
        .await;
    fixture.wait_for_state("my-plugin", 0, "running").await;

    let response = fixture
        .post_empty("/api/v1/plugins/my-plugin/builds/0/cancel")
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    for _ in 0..200 {
        if fixture
            .orchestrator
            .status()
            .await
            .active_builds
            .is_empty()
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    // Finished builds can no longer be cancelled
    let again = fixture
        .post_empty("/api/v1/plugins/my-plugin/builds/0/cancel")
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let build = fixture.get("/api/v1/plugins/my-plugin/builds/0").await;
    assert_eq!(build.body["state"], "running");
    assert_eq!(fixture.artifacts.upload_count().await, 0);
}

#[tokio::test]
async fn test_cancel_unknown_build() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post_empty("/api/v1/plugins/my-plugin/builds/3/cancel")
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Versions
// =============================================================================

#[tokio::test]
async fn test_versions_after_successful_build() {
    let fixture = TestFixture::new().await;
    fixture
        .post("/api/v1/plugins/my-plugin/builds", build_request())
        .await;
    fixture.wait_for_state("my-plugin", 0, "uploaded").await;

    let response = fixture.get("/api/v1/plugins/my-plugin/versions").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["plugin_slug"], "my-plugin");
    let versions = response.body["versions"].as_array().unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0]["version"], "1.0.0");
    assert_eq!(versions[0]["min_host_version"], "1.2.0");
    assert_eq!(versions[0]["build_id"], 0);
    assert_eq!(versions[0]["pre_release"], true);
}

#[tokio::test]
async fn test_latest_versions_filters() {
    let fixture = TestFixture::new().await;
    fixture
        .post("/api/v1/plugins/my-plugin/builds", build_request())
        .await;
    fixture.wait_for_state("my-plugin", 0, "uploaded").await;

    // New versions are pre-releases
    let stable = fixture.get("/api/v1/versions").await;
    assert_eq!(stable.status, StatusCode::OK);
    assert_eq!(stable.body["versions"], json!([]));

    let all = fixture
        .get("/api/v1/versions?include_pre_release=true")
        .await;
    assert_eq!(all.body["versions"].as_array().unwrap().len(), 1);

    let old_host = fixture
        .get("/api/v1/versions?include_pre_release=true&host_version=1.1.9")
        .await;
    assert_eq!(old_host.body["versions"], json!([]));

    let new_host = fixture
        .get("/api/v1/versions?include_pre_release=true&host_version=1.2.0")
        .await;
    assert_eq!(
        new_host.body["versions"][0]["plugin_slug"],
        "my-plugin"
    );
}

#[tokio::test]
async fn test_latest_versions_with_invalid_host_version() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/versions?host_version=latest").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid host_version"));
}

// =============================================================================
// Outside the API
// =============================================================================

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let response = fixture.get("/metrics").await;

    assert_eq!(response.status, StatusCode::OK);
    let text = response.body.as_str().unwrap();
    assert!(text.contains("plugin_builder_http_requests_total"));
    assert!(text.contains("plugin_builder_build_slots_available"));
}

#[tokio::test]
async fn test_artifacts_are_served() {
    let fixture = TestFixture::new().await;
    let dir = fixture.temp_dir.path().join("artifacts/my-plugin/0");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("MyPlugin.btcpay"), "plugin bytes").unwrap();

    let response = fixture
        .get("/artifacts/my-plugin/0/MyPlugin.btcpay")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!("plugin bytes"));
}
