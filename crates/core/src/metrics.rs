//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Builds (outcomes, durations, state transitions, failing phases)
//! - Log capture
//! - Version registration

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Builds
// =============================================================================

/// Builds finished, by outcome.
pub static BUILDS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("plugin_builder_builds_finished_total", "Total builds finished"),
        &["outcome"], // "uploaded", "failed", "cancelled"
    )
    .unwrap()
});

/// Wall-clock duration of a build, from slot acquisition to release.
pub static BUILD_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "plugin_builder_build_duration_seconds",
            "Duration of a build pipeline",
        )
        .buckets(vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Time spent waiting for a concurrency slot.
pub static SLOT_WAIT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "plugin_builder_slot_wait_seconds",
            "Time a build waited for a concurrency slot",
        )
        .buckets(vec![0.01, 0.1, 1.0, 5.0, 30.0, 60.0, 300.0, 900.0]),
        &[],
    )
    .unwrap()
});

/// Persisted state transitions, by new state.
pub static STATE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "plugin_builder_state_transitions_total",
            "Total build state transitions",
        ),
        &["state"],
    )
    .unwrap()
});

/// Hard failures, by the phase that failed.
pub static BUILD_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("plugin_builder_build_failures_total", "Total build failures"),
        &["phase"], // "provisioning", "execution", "artifact_read", ...
    )
    .unwrap()
});

// =============================================================================
// Logs and versions
// =============================================================================

/// Build log lines captured.
pub static BUILD_LOG_LINES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "plugin_builder_build_log_lines_total",
        "Total build log lines captured",
    )
    .unwrap()
});

/// Versions registered after a successful upload.
pub static VERSIONS_REGISTERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "plugin_builder_versions_registered_total",
        "Total plugin versions registered",
    )
    .unwrap()
});

/// Uploaded builds whose manifest identifier belongs to another plugin.
pub static OWNERSHIP_MISMATCHES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "plugin_builder_ownership_mismatches_total",
        "Total manifest identifier ownership mismatches",
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Builds
        Box::new(BUILDS_FINISHED.clone()),
        Box::new(BUILD_DURATION.clone()),
        Box::new(SLOT_WAIT_DURATION.clone()),
        Box::new(STATE_TRANSITIONS.clone()),
        Box::new(BUILD_FAILURES.clone()),
        // Logs and versions
        Box::new(BUILD_LOG_LINES.clone()),
        Box::new(VERSIONS_REGISTERED.clone()),
        Box::new(OWNERSHIP_MISMATCHES.clone()),
    ]
}
