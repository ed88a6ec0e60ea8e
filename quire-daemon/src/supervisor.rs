//! Owns each site's watcher / upload-worker pair.
//!
//! A pair is started at most once per host for the life of the process.
//! The upload worker may come up ahead of its watcher (first deploy seeds
//! the queue before the watcher is attached); the watcher is attached last.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use quire_core::config::resolve_credentials;
use quire_core::{Config, HostName, PublishCredentials, SiteDirs, SiteRegistration};
use quire_publish::{StoreConnector, UploadTask, UploadWorker};

use crate::error::DaemonError;
use crate::watcher::{ChangeWatcher, COALESCE_WINDOW};

/// Upload queue capacity. A full queue makes the watcher wait for the worker.
const UPLOAD_QUEUE_DEPTH: usize = 1;

struct SitePair {
    credentials: PublishCredentials,
    uploads: mpsc::Sender<UploadTask>,
    uploader: JoinHandle<()>,
    watcher: Option<JoinHandle<()>>,
}

pub struct SiteSupervisor {
    base_dir: PathBuf,
    config: Arc<Config>,
    connector: Arc<dyn StoreConnector>,
    coalesce_window: std::time::Duration,
    pairs: HashMap<HostName, SitePair>,
}

impl SiteSupervisor {
    pub fn new(base_dir: PathBuf, config: Arc<Config>, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            base_dir,
            config,
            connector,
            coalesce_window: COALESCE_WINDOW,
            pairs: HashMap::new(),
        }
    }

    pub fn with_coalesce_window(mut self, window: std::time::Duration) -> Self {
        self.coalesce_window = window;
        self
    }

    /// The site's upload queue and the credentials its tasks carry,
    /// starting the worker on first use.
    pub fn uploader(
        &mut self,
        site: &SiteRegistration,
    ) -> Result<(mpsc::Sender<UploadTask>, PublishCredentials), DaemonError> {
        if let Some(pair) = self.pairs.get(&site.host_name) {
            return Ok((pair.uploads.clone(), pair.credentials.clone()));
        }
        let dirs = SiteDirs::resolve(&self.base_dir, &site.host_name);
        let credentials = resolve_credentials(&self.config, &dirs, &site.host_name)?;
        let (uploads, queue) = mpsc::channel::<UploadTask>(UPLOAD_QUEUE_DEPTH);
        let worker = UploadWorker::new(site.host_name.clone(), self.connector.clone());
        let uploader = tokio::spawn(worker.run(queue));
        tracing::info!(host = %site.host_name, bucket = %credentials.bucket, "upload worker attached");
        self.pairs.insert(
            site.host_name.clone(),
            SitePair {
                credentials: credentials.clone(),
                uploads: uploads.clone(),
                uploader,
                watcher: None,
            },
        );
        Ok((uploads, credentials))
    }

    /// Ensure the site has both halves running. Idempotent.
    pub fn attach(&mut self, site: &SiteRegistration) -> Result<(), DaemonError> {
        if self.is_attached(&site.host_name) {
            return Ok(());
        }
        let (uploads, credentials) = self.uploader(site)?;
        let dirs = SiteDirs::resolve(&self.base_dir, &site.host_name);
        let watcher = ChangeWatcher::start(site.host_name.clone(), &dirs.live, credentials, uploads)
            .map_err(|err| DaemonError::WatcherSetup {
                host: site.host_name.to_string(),
                reason: err.to_string(),
            })?
            .with_window(self.coalesce_window);

        let host = site.host_name.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = watcher.run().await {
                tracing::error!(host = %host, error = %err, "watcher stopped with error");
            }
        });
        if let Some(pair) = self.pairs.get_mut(&site.host_name) {
            pair.watcher = Some(handle);
        }
        Ok(())
    }

    /// Watcher running (or finished) for `host`.
    pub fn is_attached(&self, host: &HostName) -> bool {
        self.pairs
            .get(host)
            .map(|pair| pair.watcher.is_some())
            .unwrap_or(false)
    }

    pub fn has_uploader(&self, host: &HostName) -> bool {
        self.pairs.contains_key(host)
    }

    pub fn attached_hosts(&self) -> Vec<HostName> {
        let mut hosts: Vec<HostName> = self
            .pairs
            .iter()
            .filter(|(_, pair)| pair.watcher.is_some())
            .map(|(host, _)| host.clone())
            .collect();
        hosts.sort();
        hosts
    }

    /// Abort every watcher and worker. Queued uploads are lost.
    pub fn shutdown(&mut self) {
        for (host, pair) in self.pairs.drain() {
            if let Some(watcher) = pair.watcher {
                watcher.abort();
            }
            pair.uploader.abort();
            tracing::debug!(host = %host, "site pair stopped");
        }
    }
}
