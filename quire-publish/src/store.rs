//! Object-store contract.
//!
//! [`StoreConnector::connect`] is the session-establishing step; the upload
//! worker calls it again whenever its session goes stale.

use std::sync::Arc;

use async_trait::async_trait;

use quire_core::PublishCredentials;

use crate::error::PublishError;

/// Canned ACL applied to a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acl {
    Private,
    PublicRead,
}

impl Acl {
    pub fn as_header(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
        }
    }
}

/// One object write.
#[derive(Debug, Clone, Copy)]
pub struct PutObject<'a> {
    /// Slash-separated key relative to the bucket root.
    pub key: &'a str,
    pub body: &'a [u8],
    pub content_type: &'a str,
    pub acl: Acl,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `object`, replacing any existing object at the same key.
    async fn put(&self, object: PutObject<'_>) -> Result<(), PublishError>;
}

pub trait StoreConnector: Send + Sync {
    /// Open a session bound to `credentials` (and their bucket).
    fn connect(&self, credentials: &PublishCredentials)
        -> Result<Arc<dyn ObjectStore>, PublishError>;
}
