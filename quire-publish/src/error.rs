//! Error types for quire-publish.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while publishing a file.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Transport-level failure talking to the store.
    #[error("object store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("object store rejected {key}: HTTP {status}: {body}")]
    Status { key: String, status: u16, body: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid object store endpoint '{0}'")]
    InvalidEndpoint(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PublishError {
    PublishError::Io {
        path: path.into(),
        source,
    }
}
