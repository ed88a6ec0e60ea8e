//! # quire-publish
//!
//! Incremental publishing of a site's live directory to an object store.
//!
//! - [`task`]: [`UploadTask`] and the first-deploy seed walk
//! - [`store`]: the [`ObjectStore`] / [`StoreConnector`] contract
//! - [`s3`]: S3-compatible implementation (SigV4 over reqwest)
//! - [`worker`]: [`UploadSession`] (TTL refresh) and [`UploadWorker`]
//!   (one retry, then drop)

pub mod content_type;
pub mod error;
pub mod s3;
pub mod sigv4;
pub mod store;
pub mod task;
pub mod worker;

pub use error::PublishError;
pub use quire_core::PublishCredentials;
pub use s3::{S3Connector, S3Store};
pub use store::{Acl, ObjectStore, PutObject, StoreConnector};
pub use task::{seed_tasks, UploadTask};
pub use worker::{UploadOutcome, UploadSession, UploadWorker, RETRY_BACKOFF, SESSION_TTL};
