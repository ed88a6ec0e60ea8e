//! Error types for quire-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Underlying I/O failure, with the file it happened on.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (save path).
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The sites file exists but is not a JSON array of registrations.
    #[error("failed to parse sites file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A registration with this host name already exists.
    #[error("host already registered: {host}")]
    DuplicateHost { host: String },

    /// The host name cannot be used as a directory name.
    #[error("invalid host name '{host}': {reason}")]
    InvalidHost { host: String, reason: &'static str },

    /// The sites file names a host that cannot be used as a directory name.
    #[error("sites file {path} has an invalid host name '{host}': {reason}")]
    InvalidEntry {
        path: PathBuf,
        host: String,
        reason: &'static str,
    },

    /// The blocking persistence task panicked or was cancelled.
    #[error("registry persistence task failed: {0}")]
    Join(String),
}

/// Errors raised while loading global configuration or per-site overrides.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// No default object-store access key; nothing could ever publish.
    #[error("no default object-store key configured (store.key)")]
    MissingStoreKey,

    /// No default object-store secret.
    #[error("no default object-store secret configured (store.secret)")]
    MissingStoreSecret,

    /// A per-site override file exists but cannot be used.
    #[error("invalid publish override at {path}: {source}")]
    InvalidDeployConfig {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RegistryError {
    RegistryError::Io {
        path: path.into(),
        source,
    }
}
