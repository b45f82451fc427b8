//! Sinks receiving process output line by line.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::build::BuildIdentity;
use crate::events::EventBus;
use crate::metrics::BUILD_LOG_LINES;
use crate::store::BuildStore;

/// Append-only sink for lines of text.
pub trait OutputSink: Send + Sync {
    /// Append one line (without its terminator).
    fn add_line(&self, line: &str);
}

/// In-memory sink for short-lived commands where only the final text matters.
#[derive(Debug, Default)]
pub struct OutputCapture {
    lines: Mutex<Vec<String>>,
}

impl OutputCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Everything appended so far, newline separated.
    pub fn text(&self) -> String {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .join("\n")
    }
}

impl OutputSink for OutputCapture {
    fn add_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

/// Durable sink for a build's log.
///
/// Every line is persisted before the next one is accepted and then
/// published as a `BuildLogUpdated` event, so the durable tail and the live
/// tail see the same lines in the same order. Blank lines are dropped.
/// Lines are not kept in memory; only their count is.
pub struct BuildLogCapture {
    identity: BuildIdentity,
    store: Arc<dyn BuildStore>,
    events: EventBus,
    line_count: Mutex<usize>,
}

impl BuildLogCapture {
    pub fn new(identity: BuildIdentity, store: Arc<dyn BuildStore>, events: EventBus) -> Self {
        Self {
            identity,
            store,
            events,
            line_count: Mutex::new(0),
        }
    }

    pub fn identity(&self) -> &BuildIdentity {
        &self.identity
    }

    pub fn line_count(&self) -> usize {
        *self.line_count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OutputSink for BuildLogCapture {
    fn add_line(&self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return;
        }

        // Persist and publish under one lock: both tails keep the same order.
        let mut count = self.line_count.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.store.append_log(&self.identity, line) {
            warn!("Failed to persist log line for build {}: {}", self.identity, e);
        }
        *count += 1;
        BUILD_LOG_LINES.inc();
        self.events.log_updated(&self.identity, line);
    }
}
