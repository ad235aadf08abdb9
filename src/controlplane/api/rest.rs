//! REST API Handlers
//!
//! Operational endpoints of the control plane: health, metrics, the array
//! registry, connectivity probing, handle parsing and replication.

use crate::array::{ArrayConfigSource, ArrayRegistry, ArraySummary};
use crate::controlplane::codec::VolumeHandleCodec;
use crate::controlplane::connectivity::{ConnectivityProbe, ConnectivityRequest};
use crate::controlplane::replication::{
    ActionType, Attributes, ReplicationOrchestrator, VolumeGroupSnapshotRequest,
};
use crate::domain::ports::ClientFactory;
use crate::error::{Code, Error};
use crate::metrics::ControllerMetrics;
use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request naming one volume handle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeHandleRequest {
    pub volume_handle: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// Request carrying protection group attributes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionGroupRequest {
    #[serde(default)]
    pub attributes: Attributes,
}

/// Request to run an action on a protection group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action: ActionType,
    #[serde(default)]
    pub attributes: Attributes,
}

/// Registry reload response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResponse {
    pub array_count: usize,
    pub default_array: Option<String>,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiErrorResponse {
    /// HTTP status and error name for a control plane error
    pub fn status_for(code: Code) -> (StatusCode, &'static str) {
        match code {
            Code::InvalidArgument => (StatusCode::BAD_REQUEST, "invalid_argument"),
            Code::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            Code::AlreadyExists => (StatusCode::CONFLICT, "already_exists"),
            Code::FailedPrecondition => (StatusCode::PRECONDITION_FAILED, "failed_precondition"),
            Code::Aborted => (StatusCode::CONFLICT, "aborted"),
            Code::DeadlineExceeded => (StatusCode::GATEWAY_TIMEOUT, "deadline_exceeded"),
            Code::Unimplemented => (StatusCode::NOT_IMPLEMENTED, "unimplemented"),
            Code::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            Code::Unknown => (StatusCode::INTERNAL_SERVER_ERROR, "unknown"),
        }
    }
}

/// Render a control plane error
fn error_response(err: Error) -> Response {
    let (status, name) = ApiErrorResponse::status_for(err.code());
    if status.is_server_error() {
        error!(error = %err, "request failed");
    } else {
        warn!(error = %err, "request rejected");
    }

    let body = ApiErrorResponse {
        error: name.into(),
        message: err.to_string(),
        details: err.api_error().map(|e| e.message.clone()),
    };
    (status, Json(body)).into_response()
}

fn json_result<T: Serialize>(result: crate::error::Result<T>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => error_response(e),
    }
}

// =============================================================================
// REST Router
// =============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ArrayRegistry>,
    pub codec: VolumeHandleCodec,
    pub probe: Arc<ConnectivityProbe>,
    pub replication: Arc<ReplicationOrchestrator>,
    pub metrics: Arc<ControllerMetrics>,
    /// Source re-read on reload
    pub config_source: Arc<ArrayConfigSource>,
    pub client_factory: Arc<dyn ClientFactory>,
}

/// REST API router builder
pub struct RestRouter {
    state: AppState,
}

impl RestRouter {
    /// Create a new REST router
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        Router::new()
            // Array endpoints
            .route("/v1/arrays", get(list_arrays))
            .route("/v1/arrays/reload", post(reload_arrays))
            .route("/v1/arrays/:id", get(get_array))
            // Volume endpoints
            .route("/v1/connectivity", post(validate_connectivity))
            .route("/v1/volume-handles/parse", post(parse_volume_handle))
            .route("/v1/volumes/delete-local", post(delete_local_volume))
            .route("/v1/remote-volumes", post(create_remote_volume))
            .route("/v1/volume-group-snapshots", post(create_volume_group_snapshot))
            // Replication endpoints
            .route("/v1/replication/capabilities", get(replication_capabilities))
            .route("/v1/protection-groups", post(create_protection_group))
            .route("/v1/protection-groups/:id/status", post(protection_group_status))
            .route("/v1/protection-groups/:id/actions", post(execute_action))
            .route("/v1/protection-groups/:id/delete", post(delete_protection_group))
            // Operational endpoints
            .route("/metrics", get(metrics))
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state)
    }
}

// =============================================================================
// Array Handlers
// =============================================================================

async fn list_arrays(State(state): State<AppState>) -> impl IntoResponse {
    let arrays: Vec<ArraySummary> = state.registry.all().iter().map(|a| a.summary()).collect();
    (StatusCode::OK, Json(arrays))
}

async fn get_array(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.get(&id) {
        Ok(array) => (StatusCode::OK, Json(array.summary())).into_response(),
        Err(_) => error_response(Error::NotFound {
            kind: "array".into(),
            id,
        }),
    }
}

async fn reload_arrays(State(state): State<AppState>) -> Response {
    info!("Reloading array registry");
    let registry = state.registry.clone();
    let source = state.config_source.clone();
    let factory = state.client_factory.clone();

    // Reads the config file and builds clients
    let reloaded = tokio::task::spawn_blocking(move || registry.reload(&source, factory.as_ref()))
        .await
        .map_err(|e| Error::Internal(format!("registry reload task failed: {}", e)))
        .and_then(|result| result);

    match reloaded {
        Ok(count) => {
            state.metrics.record_registry_reload("success");
            let default_array = state
                .registry
                .default_array()
                .map(|a| a.global_id().to_string());
            (
                StatusCode::OK,
                Json(ReloadResponse {
                    array_count: count,
                    default_array,
                }),
            )
                .into_response()
        }
        Err(e) => {
            state.metrics.record_registry_reload("failure");
            error_response(e)
        }
    }
}

// =============================================================================
// Volume Handlers
// =============================================================================

async fn validate_connectivity(
    State(state): State<AppState>,
    Json(request): Json<ConnectivityRequest>,
) -> Response {
    let deadline = state.probe.deadline();
    json_result(
        state
            .probe
            .validate_volume_host_connectivity(&request, &deadline)
            .await,
    )
}

async fn parse_volume_handle(
    State(state): State<AppState>,
    Json(request): Json<VolumeHandleRequest>,
) -> Response {
    json_result(state.codec.decode(&request.volume_handle).await)
}

async fn delete_local_volume(
    State(state): State<AppState>,
    Json(request): Json<VolumeHandleRequest>,
) -> Response {
    match state
        .replication
        .delete_local_volume(&request.volume_handle)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

async fn create_remote_volume(
    State(state): State<AppState>,
    Json(request): Json<VolumeHandleRequest>,
) -> Response {
    json_result(
        state
            .replication
            .create_remote_volume(&request.volume_handle, &request.parameters)
            .await,
    )
}

async fn create_volume_group_snapshot(
    State(state): State<AppState>,
    Json(request): Json<VolumeGroupSnapshotRequest>,
) -> Response {
    json_result(state.replication.create_volume_group_snapshot(&request).await)
}

// =============================================================================
// Replication Handlers
// =============================================================================

async fn replication_capabilities(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(state.replication.get_replication_capabilities()),
    )
}

async fn create_protection_group(
    State(state): State<AppState>,
    Json(request): Json<VolumeHandleRequest>,
) -> Response {
    json_result(
        state
            .replication
            .create_storage_protection_group(&request.volume_handle, &request.parameters)
            .await,
    )
}

async fn protection_group_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ProtectionGroupRequest>,
) -> Response {
    json_result(
        state
            .replication
            .get_storage_protection_group_status(&id, &request.attributes)
            .await,
    )
}

async fn execute_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ActionRequest>,
) -> Response {
    info!(group_id = %id, action = %request.action, "executing replication action");
    json_result(
        state
            .replication
            .execute_action(&id, &request.attributes, request.action)
            .await,
    )
}

async fn delete_protection_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ProtectionGroupRequest>,
) -> Response {
    match state
        .replication
        .delete_storage_protection_group(&id, &request.attributes)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

// =============================================================================
// Operational Handlers
// =============================================================================

async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.gather_text() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.registry.is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "no arrays registered")
    } else {
        (StatusCode::OK, "ready")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::connectivity::{HttpNodeStatusClient, ProbeConfig, CAPABILITY_MESSAGE};
    use crate::controlplane::replication::ReplicationConfig;
    use crate::domain::ports::{ReplicationSession, VolumeGroup};
    use crate::testing::{mock_registry, volume, MockArrayClient, MockClientFactory};
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    const ARRAYS_YAML: &str = r#"
arrays:
  - endpoint: "https://10.0.1.1/api/rest"
    globalID: "PS1001"
    username: "admin"
    password: "secret"
  - endpoint: "https://10.0.1.2/api/rest"
    globalID: "PS1002"
    username: "admin"
    password: "secret"
    isDefault: true
"#;

    fn state_with(config_source: ArrayConfigSource) -> (AppState, Arc<MockArrayClient>) {
        let (registry, clients) = mock_registry(&[("PS0001", "10.0.0.1")]);
        let metrics = ControllerMetrics::new().unwrap();
        let codec = VolumeHandleCodec::new(registry.clone());
        let status_client = Arc::new(HttpNodeStatusClient::new(8083, Duration::from_millis(200)).unwrap());
        let probe = ConnectivityProbe::new(codec.clone(), status_client, ProbeConfig::default(), metrics.clone());
        let replication = ReplicationOrchestrator::new(codec.clone(), ReplicationConfig::default(), metrics.clone());

        let state = AppState {
            registry,
            codec,
            probe: Arc::new(probe),
            replication: Arc::new(replication),
            metrics,
            config_source: Arc::new(config_source),
            client_factory: Arc::new(MockClientFactory::new()),
        };
        (state, clients["PS0001"].clone())
    }

    fn state() -> (AppState, Arc<MockArrayClient>) {
        state_with(ArrayConfigSource::Yaml(ARRAYS_YAML.to_string()))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let (state, _) = state();
        let app = RestRouter::new(state).build();

        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_and_get_arrays() {
        let (state, _) = state();
        let app = RestRouter::new(state).build();

        let response = app.clone().oneshot(get("/v1/arrays")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body[0]["globalID"], "PS0001");
        assert_eq!(body[0]["ip"], "10.0.0.1");

        let response = app.oneshot(get("/v1/arrays/PS0404")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "not_found");
        assert_eq!(body["message"], "Resource not found: array/PS0404");
    }

    #[tokio::test]
    async fn test_reload_from_config_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), ARRAYS_YAML).unwrap();
        let (state, _) = state_with(ArrayConfigSource::File(file.path().to_path_buf()));
        let registry = state.registry.clone();
        let app = RestRouter::new(state).build();

        let response = app.oneshot(post_json("/v1/arrays/reload", serde_json::json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["arrayCount"], 2);
        assert!(registry.get("PS1001").is_ok());
    }

    #[tokio::test]
    async fn test_reload_replaces_arrays() {
        let (state, _) = state();
        let registry = state.registry.clone();
        let metrics = state.metrics.clone();
        let app = RestRouter::new(state).build();

        let response = app.oneshot(post_json("/v1/arrays/reload", serde_json::json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["arrayCount"], 2);
        assert_eq!(body["defaultArray"], "PS1002");

        assert!(registry.get("PS0001").is_err());
        assert!(metrics.gather_text().unwrap().contains("result=\"success\"} 1"));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_arrays() {
        let (state, _) = state_with(ArrayConfigSource::Yaml("arrays: [".to_string()));
        let registry = state.registry.clone();
        let app = RestRouter::new(state).build();

        let response = app.oneshot(post_json("/v1/arrays/reload", serde_json::json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(registry.get("PS0001").is_ok());
    }

    #[tokio::test]
    async fn test_parse_volume_handle() {
        let (state, _) = state();
        let app = RestRouter::new(state).build();

        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/volume-handles/parse",
                serde_json::json!({"volumeHandle": "vol-1/10.0.0.1/scsi:vol-9/PS0009"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["arrayId"], "PS0001");
        assert_eq!(body["remote"]["volumeId"], "vol-9");

        let response = app
            .oneshot(post_json(
                "/v1/volume-handles/parse",
                serde_json::json!({"volumeHandle": "vol-1/PS0001/iscsi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_connectivity_capability_probe() {
        let (state, _) = state();
        let app = RestRouter::new(state).build();

        let response = app
            .oneshot(post_json("/v1/connectivity", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["messages"][0], CAPABILITY_MESSAGE);
    }

    #[tokio::test]
    async fn test_replication_endpoints() {
        let (state, client) = state();
        client.add_volume(volume("vol-1"));
        client.add_volume_group(VolumeGroup {
            id: "vg-1".into(),
            name: "grp".into(),
            volumes: vec![volume("vol-1")],
            ..Default::default()
        });
        client.add_session(ReplicationSession {
            id: "rs-1".into(),
            state: "Failing_Over".into(),
            role: "Source".into(),
            local_resource_id: "vg-1".into(),
            ..Default::default()
        });
        let app = RestRouter::new(state).build();
        let attributes = serde_json::json!({"replication.storage/globalID": "PS0001"});

        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/protection-groups/vg-1/status",
                serde_json::json!({"attributes": attributes}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["state"], "SYNC_IN_PROGRESS");

        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/protection-groups/vg-1/actions",
                serde_json::json!({"action": "FAILOVER_REMOTE", "attributes": attributes}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"], "aborted");

        let response = app
            .clone()
            .oneshot(get("/v1/replication/capabilities"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["actions"].as_array().unwrap().len(), 6);

        let response = app
            .oneshot(post_json(
                "/v1/volumes/delete-local",
                serde_json::json!({"volumeHandle": "vol-gone/PS0001/scsi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (state, _) = state();
        state.metrics.record_connectivity_check("connected");
        let app = RestRouter::new(state).build();

        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("array_connectivity_checks_total"));
    }
}
