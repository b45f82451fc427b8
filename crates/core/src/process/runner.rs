//! Process runner trait and the tokio-based implementation.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::cancel::CancelSignal;
use super::capture::OutputSink;
use super::error::ProcessError;
use super::types::{ProcessOutcome, ProcessSpec};

/// Runs external commands, forwarding output line by line.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `spec` to completion.
    ///
    /// Every line the process writes reaches `stdout`/`stderr` before this
    /// returns. Cancelling `cancel` terminates the child and yields
    /// [`ProcessOutcome::Cancelled`].
    async fn run(
        &self,
        spec: &ProcessSpec,
        stdout: &dyn OutputSink,
        stderr: &dyn OutputSink,
        cancel: &CancelSignal,
    ) -> Result<ProcessOutcome, ProcessError>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn spawn(spec: &ProcessSpec) -> Result<Child, ProcessError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = spec.working_dir {
            command.current_dir(dir);
        }

        command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::NotFound {
                    program: spec.program.clone(),
                }
            } else {
                ProcessError::SpawnFailed {
                    program: spec.program.clone(),
                    source: e,
                }
            }
        })
    }

    async fn terminate(child: &mut Child, spec: &ProcessSpec) {
        debug!("Cancelling {}", spec.program);
        if let Err(e) = child.kill().await {
            warn!("Failed to kill {}: {}", spec.program, e);
        }
    }
}

fn lines_of<R: AsyncRead + Unpin>(reader: R) -> tokio::io::Split<BufReader<R>> {
    BufReader::new(reader).split(b'\n')
}

fn decode(segment: &[u8]) -> String {
    let text = String::from_utf8_lossy(segment);
    text.trim_end_matches('\r').to_string()
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        spec: &ProcessSpec,
        stdout: &dyn OutputSink,
        stderr: &dyn OutputSink,
        cancel: &CancelSignal,
    ) -> Result<ProcessOutcome, ProcessError> {
        debug!("Running: {}", spec);

        if cancel.is_cancelled() {
            return Ok(ProcessOutcome::Cancelled);
        }

        let mut child = Self::spawn(spec)?;
        let io_error = |source: std::io::Error| ProcessError::Io {
            program: spec.program.clone(),
            source,
        };

        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| io_error(std::io::Error::other("stdout was not captured")))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| io_error(std::io::Error::other("stderr was not captured")))?;

        let mut out_lines = lines_of(stdout_pipe);
        let mut err_lines = lines_of(stderr_pipe);
        let mut out_open = true;
        let mut err_open = true;

        // Both pipes are drained from this one task, so sinks observe lines in
        // arrival order and have seen all of them before the exit status is read.
        while out_open || err_open {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    Self::terminate(&mut child, spec).await;
                    return Ok(ProcessOutcome::Cancelled);
                }
                segment = out_lines.next_segment(), if out_open => match segment {
                    Ok(Some(bytes)) => stdout.add_line(&decode(&bytes)),
                    Ok(None) => out_open = false,
                    Err(e) => return Err(io_error(e)),
                },
                segment = err_lines.next_segment(), if err_open => match segment {
                    Ok(Some(bytes)) => stderr.add_line(&decode(&bytes)),
                    Ok(None) => err_open = false,
                    Err(e) => return Err(io_error(e)),
                },
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Self::terminate(&mut child, spec).await;
                return Ok(ProcessOutcome::Cancelled);
            }
            status = child.wait() => status.map_err(io_error)?,
        };

        debug!("{} finished with {:?}", spec.program, status.code());
        Ok(ProcessOutcome::Exited {
            code: status.code(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::{cancel_pair, OutputCapture};
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_captures_both_streams_and_exit_code() {
        let runner = TokioProcessRunner::new();
        let out = OutputCapture::new();
        let err = OutputCapture::new();

        let outcome = runner
            .run(
                &sh("echo out1; echo err1 1>&2; echo out2; exit 3"),
                &out,
                &err,
                &CancelSignal::never(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, ProcessOutcome::exited(3));
        assert!(!outcome.success());
        assert_eq!(out.lines(), vec!["out1", "out2"]);
        assert_eq!(err.lines(), vec!["err1"]);
    }

    #[tokio::test]
    async fn test_shared_sink_sees_every_line() {
        let runner = TokioProcessRunner::new();
        let sink = OutputCapture::new();

        let outcome = runner
            .run(
                &sh("for i in 1 2 3 4 5; do echo line$i; done"),
                &sink,
                &sink,
                &CancelSignal::never(),
            )
            .await
            .unwrap();

        assert!(outcome.success());
        assert_eq!(sink.lines(), vec!["line1", "line2", "line3", "line4", "line5"]);
    }

    #[tokio::test]
    async fn test_env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TokioProcessRunner::new();
        let out = OutputCapture::new();

        let spec = sh("echo $GIT_REPO; pwd")
            .env("GIT_REPO", "https://example.com/repo.git")
            .working_dir(dir.path());
        runner
            .run(&spec, &out, &OutputCapture::new(), &CancelSignal::never())
            .await
            .unwrap();

        let lines = out.lines();
        assert_eq!(lines[0], "https://example.com/repo.git");
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(&lines[1]).canonicalize().unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let runner = TokioProcessRunner::new();
        let sink = OutputCapture::new();
        let result = runner
            .run(
                &ProcessSpec::new("definitely-not-a-real-binary-xyz"),
                &sink,
                &sink,
                &CancelSignal::never(),
            )
            .await;
        assert!(matches!(result, Err(ProcessError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_cancellation_terminates_child() {
        let runner = TokioProcessRunner::new();
        let sink = OutputCapture::new();
        let (handle, signal) = cancel_pair();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            handle.cancel();
        });

        let started = Instant::now();
        let outcome = runner
            .run(&sh("echo started; sleep 30"), &sink, &sink, &signal)
            .await
            .unwrap();

        assert_eq!(outcome, ProcessOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(sink.lines(), vec!["started"]);
    }

    #[tokio::test]
    async fn test_pre_cancelled_signal_does_not_spawn() {
        let runner = TokioProcessRunner::new();
        let sink = OutputCapture::new();
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let outcome = runner
            .run(&sh("echo should-not-run"), &sink, &sink, &signal)
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Cancelled);
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_killed_by_signal_reports_no_code() {
        let runner = TokioProcessRunner::new();
        let sink = OutputCapture::new();
        let outcome = runner
            .run(&sh("kill -9 $$"), &sink, &sink, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Exited { code: None });
    }
}
