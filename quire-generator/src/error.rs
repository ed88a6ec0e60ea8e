//! Error types for quire-generator.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or rendering a site.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// JSON serialization error (building tera context).
    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while reading sources or writing output.
    #[error("site io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    /// `_config.yml` is not a YAML mapping.
    #[error("invalid site config at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The source tree has no `_config.yml`.
    #[error("site config not found at {path}")]
    MissingConfig { path: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.into(),
        source,
    }
}
