use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime, pipeline, and control API.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("registry error: {0}")]
    Registry(#[from] quire_core::RegistryError),

    #[error("config error: {0}")]
    Config(#[from] quire_core::ConfigError),

    #[error("render error: {0}")]
    Render(#[from] quire_generator::RenderError),

    #[error("publish error: {0}")]
    Publish(#[from] quire_publish::PublishError),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("task join failure: {0}")]
    Join(String),

    #[error("watcher setup failed for {host}: {reason}")]
    WatcherSetup { host: String, reason: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
