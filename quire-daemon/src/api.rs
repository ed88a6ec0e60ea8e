//! HTTP control API.
//!
//! `GET|POST /update?hostname=H` rebuilds a registered site.
//! `GET|POST /add?name=..&email=..&baseurl=..&hostname=..&clonetype=..&cloneurl=..`
//! registers a new site and queues its first deploy. Both paths also answer
//! with a trailing slash.
//!
//! Every reply is the JSON object `{"Code": <int>, "Message": <string>}`
//! served as `text/javascript` with `Cache-Control: no-cache`; the HTTP
//! status mirrors `Code`.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use quire_core::{HostName, RegistryError, SiteRegistration, SiteRegistry};

use crate::dispatcher::BuildQueue;

pub const UPDATE_OK: &str = "Command executed successfully";
pub const HOST_NOT_FOUND: &str = "Host not found";
pub const HOST_EXISTS: &str = "Host already registered";
pub const HOST_REQUIRED: &str = "hostname is required";

#[derive(Clone)]
pub struct AppState {
    pub registry: SiteRegistry,
    pub queue: BuildQueue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiResponse {
    pub code: u16,
    pub message: String,
}

impl ApiResponse {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_u16(),
            message: message.into(),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, message)
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        let body = serde_json::json!({ "Code": self.code, "Message": self.message }).to_string();
        (
            status,
            [
                (header::CONTENT_TYPE, "text/javascript"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            body,
        )
            .into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateParams {
    pub hostname: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AddParams {
    pub name: String,
    pub email: String,
    pub baseurl: String,
    pub hostname: String,
    pub clonetype: String,
    pub cloneurl: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/update", get(update).post(update))
        .route("/update/", get(update).post(update))
        .route("/add", get(add).post(add))
        .route("/add/", get(add).post(add))
        .with_state(state)
}

async fn update(State(state): State<AppState>, Query(params): Query<UpdateParams>) -> ApiResponse {
    let Some(site) = state.registry.find(params.hostname.trim()).await else {
        tracing::info!(host = %params.hostname, "update for unknown host");
        return ApiResponse::new(StatusCode::NOT_FOUND, HOST_NOT_FOUND);
    };
    tracing::info!(host = %site.host_name, "update requested");
    match state.queue.enqueue(site).await {
        Ok(()) => ApiResponse::ok(UPDATE_OK),
        Err(err) => {
            tracing::error!(error = %err, "cannot queue update");
            ApiResponse::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
    }
}

async fn add(State(state): State<AppState>, Query(params): Query<AddParams>) -> ApiResponse {
    let host = HostName::from(params.hostname.trim());
    if host.as_str().is_empty() {
        return ApiResponse::new(StatusCode::BAD_REQUEST, HOST_REQUIRED);
    }
    if let Err(err) = host.validate() {
        return ApiResponse::new(StatusCode::BAD_REQUEST, err.to_string());
    }

    let site = SiteRegistration::new_pending(
        params.name,
        params.email,
        params.baseurl,
        host,
        params.clonetype,
        params.cloneurl,
    );
    // The registry holds the post-deploy view; the queued job still carries
    // the first-deploy flag.
    let mut stored = site.clone();
    stored.needs_deployment = false;
    match state.registry.add(stored).await {
        Ok(()) => {}
        Err(RegistryError::DuplicateHost { .. }) => {
            return ApiResponse::new(StatusCode::CONFLICT, HOST_EXISTS);
        }
        Err(err) => return ApiResponse::new(StatusCode::BAD_REQUEST, err.to_string()),
    }
    tracing::info!(host = %site.host_name, site = %site.label(), "site registered");
    let pending = PendingRegistration::new(state.registry.clone(), site.host_name.clone());

    let secret = site.api_secret.clone();
    let host = site.host_name.clone();
    if let Err(err) = state.queue.enqueue(site).await {
        tracing::error!(host = %host, error = %err, "cannot queue first deploy");
        pending.roll_back().await;
        return ApiResponse::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string());
    }
    pending.commit();
    if let Err(err) = state.registry.persist().await {
        tracing::error!(host = %host, error = %err, "cannot persist sites file; registration is in memory only");
    }
    ApiResponse::ok(secret)
}

/// A registration stored ahead of its first-deploy job. Unless committed,
/// it is removed again, including when the handler is dropped mid-enqueue.
struct PendingRegistration {
    registry: SiteRegistry,
    host: Option<HostName>,
}

impl PendingRegistration {
    fn new(registry: SiteRegistry, host: HostName) -> Self {
        Self {
            registry,
            host: Some(host),
        }
    }

    fn commit(mut self) {
        self.host = None;
    }

    async fn roll_back(mut self) {
        if let Some(host) = self.host.take() {
            forget(&self.registry, &host).await;
        }
    }
}

impl Drop for PendingRegistration {
    fn drop(&mut self) {
        let Some(host) = self.host.take() else { return };
        let registry = self.registry.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { forget(&registry, &host).await });
            }
            Err(_) => {
                tracing::error!(host = %host, "no runtime to roll back an unqueued registration");
            }
        }
    }
}

async fn forget(registry: &SiteRegistry, host: &HostName) {
    if registry.remove(host).await.is_none() {
        return;
    }
    tracing::warn!(host = %host, "first deploy was never queued; registration rolled back");
    // Another add may have saved the file while this one was pending.
    if registry.path().exists() {
        if let Err(err) = registry.persist().await {
            tracing::error!(host = %host, error = %err, "cannot persist sites file after rollback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_serializes_pascal_case() {
        let body = serde_json::to_string(&ApiResponse::new(StatusCode::NOT_FOUND, HOST_NOT_FOUND))
            .expect("serialize");
        assert_eq!(body, r#"{"Code":404,"Message":"Host not found"}"#);
    }

    #[test]
    fn missing_query_fields_default_to_empty() {
        let params: AddParams = serde_json::from_str(r#"{"hostname":"a.com"}"#).expect("parse");
        assert_eq!(params.hostname, "a.com");
        assert!(params.cloneurl.is_empty());
    }
}
