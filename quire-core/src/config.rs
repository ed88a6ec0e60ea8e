//! Global configuration and per-site publish credentials.
//!
//! The global file is YAML:
//!
//! ```yaml
//! general:
//!   port: 9999
//!   base_dir: /srv/quire
//!   sites_file: sites.json
//! store:
//!   key: AKIA...
//!   secret: ...
//! ```
//!
//! Only `store.key` and `store.secret` are required; a server that cannot
//! publish anything refuses to start.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::paths::SiteDirs;
use crate::types::{HostName, PublishCredentials};

pub const DEFAULT_PORT: u16 = 9999;
pub const DEFAULT_SITES_FILE: &str = "sites.json";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub port: u16,
    /// Root of the `sites/`, `_gen/` and `_out/` trees. Empty means the
    /// current directory.
    pub base_dir: PathBuf,
    pub sites_file: PathBuf,
    /// Stream child process output to our own stdout/stderr.
    pub verbose: bool,
    pub process_timeout_secs: u64,
    pub log_json: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            base_dir: PathBuf::new(),
            sites_file: PathBuf::from(DEFAULT_SITES_FILE),
            verbose: true,
            process_timeout_secs: DEFAULT_PROCESS_TIMEOUT.as_secs(),
            log_json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub key: Option<String>,
    pub secret: Option<String>,
    pub region: String,
    /// S3-compatible endpoint (path-style addressing). `None` targets AWS.
    pub endpoint: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key: None,
            secret: None,
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
        }
    }
}

impl Config {
    /// Read, parse, and validate the file at `path`.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&contents, path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.key.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingStoreKey);
        }
        if self.store.secret.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingStoreSecret);
        }
        Ok(())
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.general.process_timeout_secs)
    }

    /// Global default credentials targeting the bucket named after `host`.
    pub fn default_credentials(&self, host: &HostName) -> PublishCredentials {
        PublishCredentials {
            key: self.store.key.clone().unwrap_or_default(),
            secret: self.store.secret.clone().unwrap_or_default(),
            bucket: host.0.clone(),
        }
    }
}

/// Resolve the credentials a site publishes with: its `_publish.yml`
/// override when present, otherwise the global defaults with the host name
/// as bucket.
pub fn resolve_credentials(
    config: &Config,
    dirs: &SiteDirs,
    host: &HostName,
) -> Result<PublishCredentials, ConfigError> {
    let path = dirs.publish_override();
    match std::fs::read_to_string(&path) {
        Ok(contents) => {
            let creds = serde_yaml::from_str::<PublishCredentials>(&contents)
                .map_err(|source| ConfigError::InvalidDeployConfig {
                    path: path.clone(),
                    source,
                })?;
            tracing::info!(host = %host, path = %path.display(), "using per-site publish override");
            Ok(creds)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Ok(config.default_credentials(host))
        }
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}
