//! REST Array Client
//!
//! [`ArrayClient`] over the array's JSON management API. Collections are
//! filtered with `field=eq.value` query parameters; single objects live under
//! `<collection>/<id>`.

use crate::array::ArrayConfig;
use crate::domain::ports::*;
use crate::error::{ApiError, ApiResult, Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Header identifying this controller to the array
pub const APPLICATION_TYPE_HEADER: &str = "application-type";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration shared by all REST array clients
#[derive(Debug, Clone)]
pub struct RestClientConfig {
    /// Timeout of a single request
    pub timeout: Duration,
    /// Maximum number of requests in flight per array
    pub rate_limit: Option<usize>,
    /// Value of the application type header
    pub application_type: String,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            rate_limit: None,
            application_type: format!("{}/{}", crate::NAME, crate::VERSION),
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// Error body returned by the management API
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    messages: Vec<ErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message_l10n: String,
}

#[derive(Debug, Deserialize)]
struct VolumeGroupMembership {
    #[serde(default)]
    volume_groups: Vec<VolumeGroup>,
}

#[derive(Debug, Serialize)]
struct AddMembers<'a> {
    volume_ids: &'a [String],
}

#[derive(Debug, Serialize)]
struct MetricsQuery<'a> {
    entity: &'a str,
    entity_id: &'a str,
    interval: MetricsInterval,
}

// =============================================================================
// Client
// =============================================================================

/// Management API client bound to one array
#[derive(Clone)]
pub struct RestArrayClient {
    http_client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    limiter: Option<Arc<Semaphore>>,
}

impl RestArrayClient {
    /// Create a new client for a configured array
    pub fn new(array: &ArrayConfig, config: &RestClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let application_type = HeaderValue::from_str(&config.application_type)
            .map_err(|e| Error::Configuration(format!("invalid application type header: {}", e)))?;
        headers.insert(HeaderName::from_static(APPLICATION_TYPE_HEADER), application_type);

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .danger_accept_invalid_certs(array.insecure)
            .build()?;

        Ok(Self {
            http_client,
            base_url: array.endpoint.trim_end_matches('/').to_string(),
            username: array.username.clone(),
            password: array.password.clone(),
            limiter: config.rate_limit.filter(|n| *n > 0).map(|n| Arc::new(Semaphore::new(n))),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// URL of a collection filtered on `field == value`
    pub fn filter_url(&self, collection: &str, field: &str, value: &str) -> String {
        format!(
            "{}?{}=eq.{}&select=*",
            self.url(collection),
            field,
            urlencoding::encode(value)
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let _permit = match &self.limiter {
            Some(limiter) => Some(
                limiter
                    .acquire()
                    .await
                    .map_err(|e| ApiError::transport(e.to_string()))?,
            ),
            None => None,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::transport(format!("request timed out: {}", e))
            } else {
                ApiError::transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let reason = status.canonical_reason().unwrap_or("no reason").to_string();
        let body = match response.text().await {
            Ok(body) if !body.trim().is_empty() => body,
            Ok(_) => reason,
            Err(e) => {
                debug!(status = %status, error = %e, "failed to read error body");
                reason
            }
        };
        let message = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) if !parsed.messages.is_empty() => parsed
                .messages
                .iter()
                .map(|m| format!("{} {}", m.code, m.message_l10n).trim().to_string())
                .collect::<Vec<_>>()
                .join("; "),
            _ => body,
        };
        debug!(status = %status, message = %message, "array API request failed");
        Err(ApiError::new(status.as_u16(), message))
    }

    async fn json<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| {
            warn!(error = %e, "unparsable array API response");
            ApiError::new(500, format!("unparsable response: {}", e))
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self.send(self.request(Method::GET, &self.url(path))).await?;
        Self::json(response).await
    }

    /// First element of a filtered collection, not-found when empty
    async fn get_by<T: DeserializeOwned>(&self, collection: &str, field: &str, value: &str) -> ApiResult<T> {
        let url = self.filter_url(collection, field, value);
        let response = self.send(self.request(Method::GET, &url)).await?;
        let items: Vec<T> = Self::json(response).await?;
        items
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::not_found(format!("no {} with {} {}", collection, field, value)))
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        let response = self
            .send(self.request(Method::POST, &self.url(path)).json(body))
            .await?;
        Self::json(response).await
    }

    async fn post_no_content<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<()> {
        self.send(self.request(Method::POST, &self.url(path)).json(body))
            .await
            .map(|_| ())
    }

    async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<()> {
        self.send(self.request(Method::PATCH, &self.url(path)).json(body))
            .await
            .map(|_| ())
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        self.send(self.request(Method::DELETE, &self.url(path)))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ArrayClient for RestArrayClient {
    async fn get_volume(&self, id: &str) -> ApiResult<Volume> {
        self.get(&format!("volume/{}?select=*", id)).await
    }

    async fn delete_volume(&self, id: &str) -> ApiResult<()> {
        self.delete(&format!("volume/{}", id)).await
    }

    async fn get_filesystem(&self, id: &str) -> ApiResult<FileSystem> {
        self.get(&format!("file_system/{}?select=*", id)).await
    }

    async fn get_volume_group(&self, id: &str) -> ApiResult<VolumeGroup> {
        self.get(&format!("volume_group/{}?select=*,volumes(*)", id)).await
    }

    async fn get_volume_group_by_name(&self, name: &str) -> ApiResult<VolumeGroup> {
        self.get_by("volume_group", "name", name).await
    }

    async fn get_volume_groups_by_volume_id(&self, volume_id: &str) -> ApiResult<Vec<VolumeGroup>> {
        let membership: VolumeGroupMembership = self
            .get(&format!("volume/{}?select=volume_groups(*)", volume_id))
            .await?;
        Ok(membership.volume_groups)
    }

    async fn create_volume_group(&self, request: &VolumeGroupCreate) -> ApiResult<CreateResponse> {
        self.post("volume_group", request).await
    }

    async fn modify_volume_group(&self, id: &str, request: &VolumeGroupModify) -> ApiResult<()> {
        self.patch(&format!("volume_group/{}", id), request).await
    }

    async fn delete_volume_group(&self, id: &str) -> ApiResult<()> {
        self.delete(&format!("volume_group/{}", id)).await
    }

    async fn add_members_to_volume_group(&self, id: &str, volume_ids: &[String]) -> ApiResult<()> {
        self.post_no_content(&format!("volume_group/{}/add_members", id), &AddMembers { volume_ids })
            .await
    }

    async fn create_volume_group_snapshot(
        &self,
        group_id: &str,
        request: &VolumeGroupSnapshotCreate,
    ) -> ApiResult<CreateResponse> {
        self.post(&format!("volume_group/{}/snapshot", group_id), request)
            .await
    }

    async fn get_replication_session_by_local_resource_id(
        &self,
        resource_id: &str,
    ) -> ApiResult<ReplicationSession> {
        self.get_by("replication_session", "local_resource_id", resource_id)
            .await
    }

    async fn execute_action_on_replication_session(
        &self,
        session_id: &str,
        action: SessionAction,
        params: Option<FailoverParams>,
    ) -> ApiResult<()> {
        let path = format!("replication_session/{}/{}", session_id, action);
        match params {
            Some(params) => self.post_no_content(&path, &params).await,
            None => self.post_no_content(&path, &serde_json::json!({})).await,
        }
    }

    async fn get_cluster(&self) -> ApiResult<Cluster> {
        let clusters: Vec<Cluster> = self.get("cluster?select=*").await?;
        clusters
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::not_found("no cluster record"))
    }

    async fn get_remote_system(&self, id: &str) -> ApiResult<RemoteSystem> {
        self.get(&format!("remote_system/{}?select=*", id)).await
    }

    async fn get_remote_system_by_name(&self, name: &str) -> ApiResult<RemoteSystem> {
        self.get_by("remote_system", "name", name).await
    }

    async fn get_protection_policy_by_name(&self, name: &str) -> ApiResult<ProtectionPolicy> {
        self.get_by("policy", "name", name).await
    }

    async fn create_protection_policy(&self, request: &ProtectionPolicyCreate) -> ApiResult<CreateResponse> {
        self.post("policy", request).await
    }

    async fn delete_protection_policy(&self, id: &str) -> ApiResult<()> {
        self.delete(&format!("policy/{}", id)).await
    }

    async fn get_replication_rule_by_name(&self, name: &str) -> ApiResult<ReplicationRule> {
        self.get_by("replication_rule", "name", name).await
    }

    async fn create_replication_rule(&self, request: &ReplicationRuleCreate) -> ApiResult<CreateResponse> {
        self.post("replication_rule", request).await
    }

    async fn delete_replication_rule(&self, id: &str) -> ApiResult<()> {
        self.delete(&format!("replication_rule/{}", id)).await
    }

    async fn performance_metrics_by_volume(
        &self,
        volume_id: &str,
        interval: MetricsInterval,
    ) -> ApiResult<Vec<PerformanceSample>> {
        let query = MetricsQuery {
            entity: "performance_metrics_by_volume",
            entity_id: volume_id,
            interval,
        };
        self.post("metrics/generate", &query).await
    }

    async fn performance_metrics_by_filesystem(
        &self,
        filesystem_id: &str,
        interval: MetricsInterval,
    ) -> ApiResult<Vec<PerformanceSample>> {
        let query = MetricsQuery {
            entity: "performance_metrics_by_file_system",
            entity_id: filesystem_id,
            interval,
        };
        self.post("metrics/generate", &query).await
    }
}

impl std::fmt::Debug for RestArrayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestArrayClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Builds [`RestArrayClient`]s for registry reloads
#[derive(Debug, Clone, Default)]
pub struct RestClientFactory {
    config: RestClientConfig,
}

impl RestClientFactory {
    pub fn new(config: RestClientConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for RestClientFactory {
    fn build(&self, config: &ArrayConfig) -> Result<ArrayClientRef> {
        let client = RestArrayClient::new(config, &self.config).map_err(|e| {
            Error::Configuration(format!(
                "unable to create client for array {}: {}",
                config.global_id, e
            ))
        })?;
        Ok(Arc::new(client))
    }
}
