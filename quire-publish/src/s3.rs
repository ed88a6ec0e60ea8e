//! S3-compatible [`ObjectStore`] using path-style addressing, so bucket
//! names containing dots (`www.example.com`) stay valid under TLS.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;

use quire_core::{PublishCredentials, StoreConfig};

use crate::error::PublishError;
use crate::sigv4::{self, SigningRequest};
use crate::store::{ObjectStore, PutObject, StoreConnector};

const SERVICE: &str = "s3";

fn default_endpoint(region: &str) -> String {
    if region == "us-east-1" {
        "https://s3.amazonaws.com".to_string()
    } else {
        format!("https://s3.{region}.amazonaws.com")
    }
}

/// One bucket, one set of credentials.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: reqwest::Client,
    endpoint: Url,
    region: String,
    credentials: PublishCredentials,
}

impl S3Store {
    pub fn new(
        client: reqwest::Client,
        endpoint: &str,
        region: &str,
        credentials: PublishCredentials,
    ) -> Result<Self, PublishError> {
        let endpoint = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|_| PublishError::InvalidEndpoint(endpoint.to_string()))?;
        if endpoint.host_str().is_none() {
            return Err(PublishError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(Self {
            client,
            endpoint,
            region: region.to_string(),
            credentials,
        })
    }

    /// `/<bucket>/<key>` with each segment percent-encoded.
    pub fn canonical_uri(&self, key: &str) -> String {
        let base = self.endpoint.path().trim_end_matches('/');
        format!(
            "{}/{}/{}",
            base,
            sigv4::uri_encode(&self.credentials.bucket, false),
            sigv4::uri_encode(key.trim_start_matches('/'), true)
        )
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn object_url(&self, canonical_uri: &str) -> Result<Url, PublishError> {
        let mut url = self.endpoint.clone();
        url.set_path(canonical_uri);
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, object: PutObject<'_>) -> Result<(), PublishError> {
        let canonical_uri = self.canonical_uri(object.key);
        let url = self.object_url(&canonical_uri)?;
        let payload_hash = sigv4::sha256_hex(object.body);
        let timestamp = Utc::now();
        let amz_date = sigv4::amz_date(&timestamp);

        let signing = SigningRequest {
            method: "PUT",
            canonical_uri: &canonical_uri,
            headers: vec![
                ("host", self.host_header()),
                ("x-amz-acl", object.acl.as_header().to_string()),
                ("x-amz-content-sha256", payload_hash.clone()),
                ("x-amz-date", amz_date.clone()),
            ],
            payload_hash: &payload_hash,
            region: &self.region,
            service: SERVICE,
            access_key: &self.credentials.key,
            secret_key: &self.credentials.secret,
            timestamp,
        };

        let response = self
            .client
            .put(url)
            .header("authorization", signing.authorization())
            .header("x-amz-acl", object.acl.as_header())
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date)
            .header("content-type", object.content_type)
            .body(object.body.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(PublishError::Status {
            key: object.key.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

/// Builds [`S3Store`]s sharing one HTTP connection pool.
#[derive(Debug, Clone)]
pub struct S3Connector {
    client: reqwest::Client,
    endpoint: String,
    region: String,
}

impl S3Connector {
    pub fn new(client: reqwest::Client, endpoint: Option<&str>, region: &str) -> Self {
        Self {
            client,
            endpoint: endpoint
                .map(str::to_string)
                .unwrap_or_else(|| default_endpoint(region)),
            region: region.to_string(),
        }
    }

    pub fn from_config(store: &StoreConfig) -> Self {
        Self::new(reqwest::Client::new(), store.endpoint.as_deref(), &store.region)
    }
}

impl StoreConnector for S3Connector {
    fn connect(
        &self,
        credentials: &PublishCredentials,
    ) -> Result<Arc<dyn ObjectStore>, PublishError> {
        let store = S3Store::new(
            self.client.clone(),
            &self.endpoint,
            &self.region,
            credentials.clone(),
        )?;
        Ok(Arc::new(store))
    }
}
