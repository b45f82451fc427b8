//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the plugin builder server:
//! - HTTP request metrics (latency, counts)
//! - WebSocket connection metrics
//! - Build slot usage (collected dynamically)
//!
//! Build pipeline metrics live in `plugin_builder_core::metrics` and are
//! registered here as well.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "plugin_builder_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("plugin_builder_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "plugin_builder_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "plugin_builder_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "plugin_builder_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "plugin_builder_ws_messages_sent_total",
            "WebSocket messages sent",
        ),
        &["type"],
    )
    .unwrap()
});

// =============================================================================
// Build Slot Metrics (collected dynamically)
// =============================================================================

/// Builds submitted and not yet finished (running or waiting for a slot).
pub static BUILDS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "plugin_builder_builds_active",
        "Number of submitted builds that have not finished",
    )
    .unwrap()
});

/// Build slots currently held.
pub static BUILD_SLOTS_IN_USE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "plugin_builder_build_slots_in_use",
        "Number of build slots currently held",
    )
    .unwrap()
});

/// Free build slots.
pub static BUILD_SLOTS_AVAILABLE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "plugin_builder_build_slots_available",
        "Number of free build slots",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();

    // Build slots
    registry.register(Box::new(BUILDS_ACTIVE.clone())).unwrap();
    registry
        .register(Box::new(BUILD_SLOTS_IN_USE.clone()))
        .unwrap();
    registry
        .register(Box::new(BUILD_SLOTS_AVAILABLE.clone()))
        .unwrap();

    // Core metrics (build pipeline)
    for metric in plugin_builder_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the slot gauges reflect the orchestrator right now.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.orchestrator().status().await;
    BUILDS_ACTIVE.set(status.active_builds.len() as i64);
    BUILD_SLOTS_IN_USE.set(status.in_use as i64);
    BUILD_SLOTS_AVAILABLE.set(status.available as i64);
}

/// Normalize a path for metric labels (replace slugs and build numbers with placeholders).
pub fn normalize_path(path: &str) -> String {
    static SLUG: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"/plugins/[^/]+").unwrap());
    static NUMERIC: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

    let result = SLUG.replace_all(path, "/plugins/{slug}");
    let result = NUMERIC.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_slug() {
        let path = "/api/v1/plugins/my-plugin/versions";
        assert_eq!(normalize_path(path), "/api/v1/plugins/{slug}/versions");
    }

    #[test]
    fn test_normalize_path_build() {
        let path = "/api/v1/plugins/my-plugin/builds/12/logs";
        assert_eq!(
            normalize_path(path),
            "/api/v1/plugins/{slug}/builds/{id}/logs"
        );
    }

    #[test]
    fn test_normalize_path_trailing_number() {
        let path = "/api/v1/plugins/btcpay-plugin-42/builds/7";
        assert_eq!(normalize_path(path), "/api/v1/plugins/{slug}/builds/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("plugin_builder_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_all_metrics() {
        // Prometheus only outputs metrics that have been accessed
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        HTTP_REQUESTS_IN_FLIGHT.set(0);
        WS_CONNECTIONS_ACTIVE.set(0);
        WS_CONNECTIONS_TOTAL.inc();
        BUILDS_ACTIVE.set(0);
        BUILD_SLOTS_IN_USE.set(0);
        BUILD_SLOTS_AVAILABLE.set(5);
        plugin_builder_core::metrics::BUILD_LOG_LINES.inc();

        let output = encode_metrics();

        assert!(output.contains("plugin_builder_http_request_duration_seconds"));
        assert!(output.contains("plugin_builder_http_requests_in_flight"));
        assert!(output.contains("plugin_builder_ws_connections_active"));
        assert!(output.contains("plugin_builder_ws_connections_total"));
        assert!(output.contains("plugin_builder_builds_active"));
        assert!(output.contains("plugin_builder_build_slots_in_use"));
        assert!(output.contains("plugin_builder_build_slots_available"));
        assert!(output.contains("plugin_builder_build_log_lines_total"));
    }
}
