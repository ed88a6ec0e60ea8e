//! Per-site upload worker.
//!
//! Protocol for each [`UploadTask`]:
//!
//! 1. Skip directories and files that vanished since the event.
//! 2. Reconnect if the session is older than [`SESSION_TTL`] since last use
//!    (or the task carries different credentials).
//! 3. `PUT` the current contents with a public-read ACL.
//! 4. On failure sleep [`RETRY_BACKOFF`] and try once more.
//! 5. On a second failure log and drop the task; keep serving the queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use quire_core::{HostName, PublishCredentials};

use crate::content_type;
use crate::error::PublishError;
use crate::store::{Acl, ObjectStore, PutObject, StoreConnector};
use crate::task::UploadTask;

pub const SESSION_TTL: Duration = Duration::from_secs(120);
pub const RETRY_BACKOFF: Duration = Duration::from_millis(100);

struct ActiveSession {
    credentials: PublishCredentials,
    store: Arc<dyn ObjectStore>,
    last_used: Instant,
}

/// Store handle plus the time it was last used.
pub struct UploadSession {
    connector: Arc<dyn StoreConnector>,
    active: Option<ActiveSession>,
    ttl: Duration,
    connects: u64,
}

impl UploadSession {
    pub fn new(connector: Arc<dyn StoreConnector>, ttl: Duration) -> Self {
        Self {
            connector,
            active: None,
            ttl,
            connects: 0,
        }
    }

    /// The store to publish with at `now`, reconnecting when stale.
    pub fn store_for(
        &mut self,
        credentials: &PublishCredentials,
        now: Instant,
    ) -> Result<Arc<dyn ObjectStore>, PublishError> {
        if let Some(active) = &self.active {
            let fresh = now.saturating_duration_since(active.last_used) <= self.ttl;
            if fresh && active.credentials == *credentials {
                return Ok(active.store.clone());
            }
        }
        let store = self.connector.connect(credentials)?;
        self.connects += 1;
        tracing::debug!(bucket = %credentials.bucket, connects = self.connects, "store session refreshed");
        self.active = Some(ActiveSession {
            credentials: credentials.clone(),
            store: store.clone(),
            last_used: now,
        });
        Ok(store)
    }

    pub fn mark_used(&mut self, now: Instant) {
        if let Some(active) = &mut self.active {
            active.last_used = now;
        }
    }

    /// Sessions opened so far, including the first.
    pub fn connects(&self) -> u64 {
        self.connects
    }
}

/// Result of handling one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Published after this many attempts (1 or 2).
    Published { attempts: u8 },
    /// Nothing to publish: the path is a directory or no longer readable.
    Skipped { reason: String },
    /// Both attempts failed, or no session could be opened.
    Dropped { error: String },
}

pub struct UploadWorker {
    host: HostName,
    session: UploadSession,
    backoff: Duration,
}

impl UploadWorker {
    pub fn new(host: HostName, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            host,
            session: UploadSession::new(connector, SESSION_TTL),
            backoff: RETRY_BACKOFF,
        }
    }

    pub fn with_timing(mut self, ttl: Duration, backoff: Duration) -> Self {
        self.session.ttl = ttl;
        self.backoff = backoff;
        self
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    /// Drain `queue` until every sender is gone.
    pub async fn run(mut self, mut queue: mpsc::Receiver<UploadTask>) {
        tracing::info!(host = %self.host, "upload worker started");
        while let Some(task) = queue.recv().await {
            self.process(task).await;
        }
        tracing::info!(host = %self.host, "upload worker stopped");
    }

    pub async fn process(&mut self, task: UploadTask) -> UploadOutcome {
        let meta = match tokio::fs::metadata(&task.file).await {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!(host = %self.host, file = %task.file.display(), error = %err, "cannot stat file; skipping");
                return UploadOutcome::Skipped {
                    reason: err.to_string(),
                };
            }
        };
        if meta.is_dir() {
            return UploadOutcome::Skipped {
                reason: "directory".to_string(),
            };
        }
        let body = match tokio::fs::read(&task.file).await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(host = %self.host, file = %task.file.display(), error = %err, "cannot read file; skipping");
                return UploadOutcome::Skipped {
                    reason: err.to_string(),
                };
            }
        };

        let store = match self.session.store_for(&task.credentials, Instant::now()) {
            Ok(store) => store,
            Err(err) => {
                tracing::error!(host = %self.host, key = %task.key(), error = %err, "no store session; dropping upload");
                return UploadOutcome::Dropped {
                    error: err.to_string(),
                };
            }
        };

        let key = task.key();
        let object = PutObject {
            key: &key,
            body: &body,
            content_type: content_type::for_path(&task.rel_path),
            acl: Acl::PublicRead,
        };

        tracing::info!(host = %self.host, key = %key, bytes = body.len(), "uploading");
        let outcome = match store.put(object).await {
            Ok(()) => UploadOutcome::Published { attempts: 1 },
            Err(first) => {
                tracing::warn!(host = %self.host, key = %key, error = %first, "upload failed; retrying once");
                tokio::time::sleep(self.backoff).await;
                match store.put(object).await {
                    Ok(()) => UploadOutcome::Published { attempts: 2 },
                    Err(second) => UploadOutcome::Dropped {
                        error: second.to_string(),
                    },
                }
            }
        };
        self.session.mark_used(Instant::now());

        match &outcome {
            UploadOutcome::Published { attempts } => {
                tracing::info!(host = %self.host, key = %key, attempts, "upload succeeded");
            }
            UploadOutcome::Dropped { error } => {
                tracing::error!(host = %self.host, key = %key, error = %error, "upload failed twice; dropped");
            }
            UploadOutcome::Skipped { .. } => {}
        }
        outcome
    }
}
