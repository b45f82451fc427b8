//! Mock process runner for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::process::{
    CancelSignal, OutputSink, ProcessError, ProcessOutcome, ProcessRunner, ProcessSpec,
};

/// Scripted behavior for one run.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// Exit code reported after the output; `None` means killed by a signal.
    pub exit_code: Option<i32>,
    /// How long the "process" runs after writing its output.
    pub duration: Duration,
    /// Fail to spawn with this message instead of running.
    pub spawn_error: Option<String>,
}

impl ScriptedRun {
    /// Exits 0 immediately with no output.
    pub fn success() -> Self {
        Self::exit(0)
    }

    pub fn exit(code: i32) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: Some(code),
            duration: Duration::ZERO,
            spawn_error: None,
        }
    }

    pub fn spawn_error(message: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(message.into()),
            ..Self::success()
        }
    }

    pub fn with_stdout<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stdout.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn with_stderr<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stderr.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Mock implementation of the ProcessRunner trait.
///
/// Runs are served from a queue of [`ScriptedRun`]s, falling back to a
/// default (exit 0) when the queue is empty. Every spec is recorded, and the
/// highest number of simultaneous runs is tracked.
#[derive(Debug)]
pub struct MockProcessRunner {
    queue: Arc<RwLock<VecDeque<ScriptedRun>>>,
    default_run: Arc<RwLock<ScriptedRun>>,
    specs: Arc<RwLock<Vec<ProcessSpec>>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl Default for MockProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(RwLock::new(VecDeque::new())),
            default_run: Arc::new(RwLock::new(ScriptedRun::success())),
            specs: Arc::new(RwLock::new(Vec::new())),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    /// Queue the behavior of the next run.
    pub async fn push(&self, run: ScriptedRun) {
        self.queue.write().await.push_back(run);
    }

    /// Behavior used once the queue is empty.
    pub async fn set_default(&self, run: ScriptedRun) {
        *self.default_run.write().await = run;
    }

    /// Get all specs that were run, in order.
    pub async fn recorded_specs(&self) -> Vec<ProcessSpec> {
        self.specs.read().await.clone()
    }

    pub async fn run_count(&self) -> usize {
        self.specs.read().await.len()
    }

    /// Runs in progress right now.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest number of runs that were in progress at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    async fn next_run(&self) -> ScriptedRun {
        match self.queue.write().await.pop_front() {
            Some(run) => run,
            None => self.default_run.read().await.clone(),
        }
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(
        &self,
        spec: &ProcessSpec,
        stdout: &dyn OutputSink,
        stderr: &dyn OutputSink,
        cancel: &CancelSignal,
    ) -> Result<ProcessOutcome, ProcessError> {
        self.specs.write().await.push(spec.clone());
        let run = self.next_run().await;

        if let Some(message) = run.spawn_error {
            return Err(ProcessError::SpawnFailed {
                program: spec.program.clone(),
                source: std::io::Error::other(message),
            });
        }
        if cancel.is_cancelled() {
            return Ok(ProcessOutcome::Cancelled);
        }

        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = RunningGuard(&self.running);
        self.max_running.fetch_max(now_running, Ordering::SeqCst);

        for line in &run.stdout {
            stdout.add_line(line);
        }
        for line in &run.stderr {
            stderr.add_line(line);
        }

        if !run.duration.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(ProcessOutcome::Cancelled),
                _ = tokio::time::sleep(run.duration) => {}
            }
        }

        Ok(ProcessOutcome::Exited {
            code: run.exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{cancel_pair, OutputCapture};

    #[tokio::test]
    async fn test_queue_then_default() {
        let runner = MockProcessRunner::new();
        runner
            .push(ScriptedRun::exit(2).with_stdout(["queued"]))
            .await;
        let sink = OutputCapture::new();

        let first = runner
            .run(&ProcessSpec::new("a"), &sink, &sink, &CancelSignal::never())
            .await
            .unwrap();
        let second = runner
            .run(&ProcessSpec::new("b"), &sink, &sink, &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(first, ProcessOutcome::exited(2));
        assert_eq!(second, ProcessOutcome::exited(0));
        assert_eq!(sink.lines(), vec!["queued"]);
        assert_eq!(runner.run_count().await, 2);
    }

    #[tokio::test]
    async fn test_long_run_is_cancellable() {
        let runner = MockProcessRunner::new();
        runner
            .push(ScriptedRun::success().with_duration(Duration::from_secs(60)))
            .await;
        let (handle, signal) = cancel_pair();
        let sink = OutputCapture::new();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });
        let outcome = runner
            .run(&ProcessSpec::new("a"), &sink, &sink, &signal)
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Cancelled);
        assert_eq!(runner.running(), 0);
    }

    #[tokio::test]
    async fn test_spawn_error() {
        let runner = MockProcessRunner::new();
        runner.push(ScriptedRun::spawn_error("boom")).await;
        let sink = OutputCapture::new();
        let result = runner
            .run(&ProcessSpec::new("a"), &sink, &sink, &CancelSignal::never())
            .await;
        assert!(matches!(result, Err(ProcessError::SpawnFailed { .. })));
    }
}
