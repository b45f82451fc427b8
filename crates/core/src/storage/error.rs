//! Error types for the storage module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while uploading an artifact.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Artifact not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Invalid destination '{destination}': {reason}")]
    InvalidDestination { destination: String, reason: String },

    #[error("Failed to create directory: {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy artifact from {source} to {destination}")]
    CopyFailed {
        source: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// The backend refused the upload.
    #[error("Upload rejected: {0}")]
    Rejected(String),
}

impl StorageError {
    pub fn invalid_destination(destination: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDestination {
            destination: destination.into(),
            reason: reason.into(),
        }
    }

    pub fn copy_failed(source: PathBuf, destination: PathBuf, error: std::io::Error) -> Self {
        Self::CopyFailed {
            source,
            destination,
            error,
        }
    }
}
