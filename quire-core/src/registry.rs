//! In-memory site registry with whole-file JSON persistence.
//!
//! # Storage layout
//!
//! ```text
//! <sites_file>        JSON array of registrations (rewritten on every save)
//! <sites_file>.tmp    staging file, renamed over the target
//! ```
//!
//! All reads and writes go through one async mutex: the control API appends
//! while other handlers iterate, and saves snapshot under the same lock so a
//! save never interleaves with an add.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{io_err, RegistryError};
use crate::types::{HostName, SiteRegistration};

#[derive(Debug, Clone)]
pub struct SiteRegistry {
    sites: Arc<Mutex<Vec<SiteRegistration>>>,
    path: PathBuf,
}

impl SiteRegistry {
    /// Empty registry that persists to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_sites(path, Vec::new())
    }

    pub fn with_sites(path: impl Into<PathBuf>, sites: Vec<SiteRegistration>) -> Self {
        Self {
            sites: Arc::new(Mutex::new(sites)),
            path: path.into(),
        }
    }

    /// Load the registry from `path`. A missing or empty file yields an empty
    /// registry; a malformed one is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let sites = load_sites_at(&path)?;
        Ok(Self::with_sites(path, sites))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a registration. Host names are unique.
    pub async fn add(&self, site: SiteRegistration) -> Result<(), RegistryError> {
        site.host_name.validate()?;
        let mut sites = self.sites.lock().await;
        if sites.iter().any(|s| s.host_name == site.host_name) {
            return Err(RegistryError::DuplicateHost {
                host: site.host_name.0,
            });
        }
        sites.push(site);
        Ok(())
    }

    /// Drop the registration for `host`, returning it if it was present.
    pub async fn remove(&self, host: &HostName) -> Option<SiteRegistration> {
        let mut sites = self.sites.lock().await;
        let index = sites.iter().position(|s| &s.host_name == host)?;
        Some(sites.remove(index))
    }

    /// Snapshot of every registration, in insertion order.
    pub async fn all(&self) -> Vec<SiteRegistration> {
        self.sites.lock().await.clone()
    }

    pub async fn find(&self, host: &str) -> Option<SiteRegistration> {
        self.sites
            .lock()
            .await
            .iter()
            .find(|s| s.host_name.as_str() == host)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.sites.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Rewrite the sites file with the current set. The lock is held until
    /// the file is in place, so concurrent saves land in order.
    pub async fn persist(&self) -> Result<(), RegistryError> {
        let sites = self.sites.lock().await;
        let snapshot = sites.clone();
        let path = self.path.clone();
        let written = snapshot.len();
        tokio::task::spawn_blocking(move || save_sites_at(&path, &snapshot))
            .await
            .map_err(|err| RegistryError::Join(err.to_string()))??;
        drop(sites);
        tracing::info!(path = %self.path.display(), sites = written, "saved sites file");
        Ok(())
    }
}

/// Read a sites file. Missing or whitespace-only files are empty registries.
/// Every host name must be usable as a directory name.
pub fn load_sites_at(path: &Path) -> Result<Vec<SiteRegistration>, RegistryError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(io_err(path, err)),
    };
    if contents.trim().is_empty() {
        return Ok(vec![]);
    }
    let sites: Vec<SiteRegistration> =
        serde_json::from_str(&contents).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    for site in &sites {
        if let Err(RegistryError::InvalidHost { host, reason }) = site.host_name.validate() {
            return Err(RegistryError::InvalidEntry {
                path: path.to_path_buf(),
                host,
                reason,
            });
        }
    }
    Ok(sites)
}

/// Atomically replace the sites file: serialize → `<file>.tmp` → `rename`.
pub fn save_sites_at(path: &Path, sites: &[SiteRegistration]) -> Result<(), RegistryError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let json = serde_json::to_vec_pretty(sites)?;
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, err));
    }
    Ok(())
}
