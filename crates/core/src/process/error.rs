//! Error types for the process module.

use thiserror::Error;

/// Errors raised while running an external command.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable does not exist.
    #[error("Executable not found: {program}")]
    NotFound { program: String },

    /// The process could not be started.
    #[error("Failed to start {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading output or waiting for exit failed.
    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
