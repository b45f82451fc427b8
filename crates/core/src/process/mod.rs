//! External process execution with line-by-line output capture.

mod cancel;
mod capture;
mod error;
mod runner;
mod types;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use capture::{BuildLogCapture, OutputCapture, OutputSink};
pub use error::ProcessError;
pub use runner::{ProcessRunner, TokioProcessRunner};
pub use types::{ProcessOutcome, ProcessSpec};
