use std::path::PathBuf;
use thiserror::Error;

use crate::process::ProcessError;

/// Errors from provisioning, reading or disposing a build workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("{command} failed with exit code {code:?}: {output}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("{command} was cancelled")]
    Cancelled { command: String },

    #[error("File {file} is missing from workspace {workspace}")]
    FileMissing { workspace: String, file: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl WorkspaceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
