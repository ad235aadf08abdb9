//! Test Support
//!
//! In-memory array client with a recorded call log, a client factory for
//! registry reloads, and a fake node status server.

use crate::array::{Array, ArrayConfig, ArrayRegistry, TransportType};
use crate::domain::ports::*;
use crate::error::{ApiError, ApiResult, Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Fixtures
// =============================================================================

/// Array definition with test credentials
pub fn array_config(global_id: &str, endpoint: &str) -> ArrayConfig {
    ArrayConfig {
        endpoint: endpoint.to_string(),
        global_id: global_id.to_string(),
        username: "admin".to_string(),
        password: "password".to_string(),
        nas_name: None,
        block_protocol: TransportType::Auto,
        insecure: true,
        is_default: false,
    }
}

/// Array bound to a fresh mock client
pub fn mock_array(global_id: &str, endpoint: &str, is_default: bool) -> (Arc<Array>, Arc<MockArrayClient>) {
    let mut config = array_config(global_id, endpoint);
    config.is_default = is_default;
    let client = MockArrayClient::new();
    let array = Array::new(config, client.clone()).expect("valid test array");
    (Arc::new(array), client)
}

/// Registry of mock arrays `(global_id, ip)`; the first one is default
pub fn mock_registry(arrays: &[(&str, &str)]) -> (Arc<ArrayRegistry>, HashMap<String, Arc<MockArrayClient>>) {
    let mut clients = HashMap::new();
    let entries = arrays
        .iter()
        .map(|(id, ip)| {
            let (array, client) = mock_array(id, &format!("https://{}/api/rest", ip), false);
            clients.insert(id.to_string(), client);
            array
        })
        .collect();
    let registry = ArrayRegistry::from_arrays(entries).expect("valid test registry");
    (registry, clients)
}

pub fn volume(id: &str) -> Volume {
    Volume {
        id: id.to_string(),
        name: format!("csi-{}", id),
        size: 8 * 1024 * 1024 * 1024,
        state: "Ready".to_string(),
        ..Default::default()
    }
}

pub fn filesystem(id: &str) -> FileSystem {
    FileSystem {
        id: id.to_string(),
        name: format!("csi-{}", id),
        size_total: 3 * 1024 * 1024 * 1024,
    }
}

/// Sample taken `age_secs` ago
pub fn sample(age_secs: i64, total_iops: f64) -> PerformanceSample {
    PerformanceSample {
        timestamp: Some(Utc::now() - ChronoDuration::seconds(age_secs)),
        total_iops,
    }
}

// =============================================================================
// Scripted Metrics
// =============================================================================

/// Scripted reply of a performance metrics query
#[derive(Debug, Clone, Default)]
pub struct MetricsReply {
    pub samples: Vec<PerformanceSample>,
    pub delay: Option<Duration>,
    pub error: Option<ApiError>,
}

impl MetricsReply {
    /// Recent sample with IO
    pub fn active() -> Self {
        Self {
            samples: vec![sample(300, 0.0), sample(5, 120.0)],
            ..Default::default()
        }
    }

    /// Recent samples without IO
    pub fn idle() -> Self {
        Self {
            samples: vec![sample(40, 0.0), sample(20, 0.0), sample(1, 0.0)],
            ..Default::default()
        }
    }

    /// Reply that effectively never arrives
    pub fn never() -> Self {
        Self::idle().delayed(Duration::from_secs(3600))
    }

    pub fn failing(error: ApiError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

// =============================================================================
// Mock Array Client
// =============================================================================

/// Array-side objects held by the mock
#[derive(Debug, Default)]
pub struct MockState {
    pub volumes: HashMap<String, Volume>,
    pub filesystems: HashMap<String, FileSystem>,
    /// Volume groups by ID
    pub volume_groups: HashMap<String, VolumeGroup>,
    /// Replication sessions by local resource ID
    pub sessions: HashMap<String, ReplicationSession>,
    pub cluster: Cluster,
    /// Remote systems by ID
    pub remote_systems: HashMap<String, RemoteSystem>,
    /// Protection policies by name
    pub policies: HashMap<String, ProtectionPolicy>,
    /// Replication rules by name
    pub rules: HashMap<String, ReplicationRule>,
    pub volume_metrics: HashMap<String, MetricsReply>,
    pub filesystem_metrics: HashMap<String, MetricsReply>,
    /// Injected failures by method name
    pub failures: HashMap<String, ApiError>,
    next_id: u64,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:04}", prefix, self.next_id)
    }

    /// Move a group between policies, keeping policy references consistent
    fn assign_policy(&mut self, group_id: &str, policy_id: Option<String>) {
        for policy in self.policies.values_mut() {
            policy.volume_groups.retain(|g| g.id != group_id);
            if policy_id.as_deref() == Some(policy.id.as_str()) {
                policy.volume_groups.push(IdRef {
                    id: group_id.to_string(),
                });
            }
        }
        if let Some(group) = self.volume_groups.get_mut(group_id) {
            group.protection_policy_id = policy_id;
        }
    }
}

/// In-memory [`ArrayClient`] recording every call it receives
#[derive(Debug, Default)]
pub struct MockArrayClient {
    state: Mutex<MockState>,
    calls: Mutex<Vec<String>>,
}

impl MockArrayClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mutate the array-side state
    pub fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn add_volume(&self, volume: Volume) {
        self.state.lock().volumes.insert(volume.id.clone(), volume);
    }

    pub fn add_filesystem(&self, filesystem: FileSystem) {
        self.state.lock().filesystems.insert(filesystem.id.clone(), filesystem);
    }

    pub fn add_volume_group(&self, group: VolumeGroup) {
        self.state.lock().volume_groups.insert(group.id.clone(), group);
    }

    pub fn add_session(&self, session: ReplicationSession) {
        self.state
            .lock()
            .sessions
            .insert(session.local_resource_id.clone(), session);
    }

    pub fn add_remote_system(&self, remote: RemoteSystem) {
        self.state.lock().remote_systems.insert(remote.id.clone(), remote);
    }

    pub fn add_policy(&self, policy: ProtectionPolicy) {
        self.state.lock().policies.insert(policy.name.clone(), policy);
    }

    pub fn add_rule(&self, rule: ReplicationRule) {
        self.state.lock().rules.insert(rule.name.clone(), rule);
    }

    pub fn set_cluster(&self, cluster: Cluster) {
        self.state.lock().cluster = cluster;
    }

    pub fn set_volume_metrics(&self, volume_id: &str, reply: MetricsReply) {
        self.state.lock().volume_metrics.insert(volume_id.to_string(), reply);
    }

    pub fn set_filesystem_metrics(&self, filesystem_id: &str, reply: MetricsReply) {
        self.state
            .lock()
            .filesystem_metrics
            .insert(filesystem_id.to_string(), reply);
    }

    /// Make every call of `method` fail with `error`
    pub fn fail(&self, method: &str, error: ApiError) {
        self.state.lock().failures.insert(method.to_string(), error);
    }

    /// Every recorded call as `method:argument`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls of `method`
    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.split(':').next() == Some(method))
            .count()
    }

    pub fn session(&self, local_resource_id: &str) -> Option<ReplicationSession> {
        self.state.lock().sessions.get(local_resource_id).cloned()
    }

    pub fn volume_group_by_name(&self, name: &str) -> Option<VolumeGroup> {
        self.state
            .lock()
            .volume_groups
            .values()
            .find(|g| g.name == name)
            .cloned()
    }

    fn record(&self, method: &str, argument: &str) -> ApiResult<()> {
        self.calls.lock().push(format!("{}:{}", method, argument));
        match self.state.lock().failures.get(method) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn metrics_reply(reply: Option<MetricsReply>, id: &str) -> ApiResult<Vec<PerformanceSample>> {
        let reply = reply.ok_or_else(|| ApiError::not_found(format!("no metrics for {}", id)))?;
        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }
        match reply.error {
            Some(error) => Err(error),
            None => Ok(reply.samples),
        }
    }
}

#[async_trait]
impl ArrayClient for MockArrayClient {
    async fn get_volume(&self, id: &str) -> ApiResult<Volume> {
        self.record("get_volume", id)?;
        self.state
            .lock()
            .volumes
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("volume {} not found", id)))
    }

    async fn delete_volume(&self, id: &str) -> ApiResult<()> {
        self.record("delete_volume", id)?;
        self.state
            .lock()
            .volumes
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found(format!("volume {} not found", id)))
    }

    async fn get_filesystem(&self, id: &str) -> ApiResult<FileSystem> {
        self.record("get_filesystem", id)?;
        self.state
            .lock()
            .filesystems
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("filesystem {} not found", id)))
    }

    async fn get_volume_group(&self, id: &str) -> ApiResult<VolumeGroup> {
        self.record("get_volume_group", id)?;
        self.state
            .lock()
            .volume_groups
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("volume group {} not found", id)))
    }

    async fn get_volume_group_by_name(&self, name: &str) -> ApiResult<VolumeGroup> {
        self.record("get_volume_group_by_name", name)?;
        self.volume_group_by_name(name)
            .ok_or_else(|| ApiError::not_found(format!("volume group {} not found", name)))
    }

    async fn get_volume_groups_by_volume_id(&self, volume_id: &str) -> ApiResult<Vec<VolumeGroup>> {
        self.record("get_volume_groups_by_volume_id", volume_id)?;
        let state = self.state.lock();
        let mut groups: Vec<_> = state
            .volume_groups
            .values()
            .filter(|g| g.volumes.iter().any(|v| v.id == volume_id))
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(groups)
    }

    async fn create_volume_group(&self, request: &VolumeGroupCreate) -> ApiResult<CreateResponse> {
        self.record("create_volume_group", &request.name)?;
        let mut state = self.state.lock();
        if state.volume_groups.values().any(|g| g.name == request.name) {
            return Err(ApiError::already_in_use(format!("name {} already in use", request.name)));
        }

        let id = state.next_id("vg");
        let volumes = request
            .volume_ids
            .iter()
            .map(|v| state.volumes.get(v).cloned().unwrap_or_else(|| volume(v)))
            .collect();
        state.volume_groups.insert(
            id.clone(),
            VolumeGroup {
                id: id.clone(),
                name: request.name.clone(),
                description: request.description.clone(),
                protection_policy_id: None,
                creation_timestamp: Some(Utc::now().to_rfc3339()),
                volumes,
            },
        );
        state.assign_policy(&id, request.protection_policy_id.clone());
        Ok(CreateResponse { id })
    }

    async fn modify_volume_group(&self, id: &str, request: &VolumeGroupModify) -> ApiResult<()> {
        self.record("modify_volume_group", id)?;
        let mut state = self.state.lock();
        if !state.volume_groups.contains_key(id) {
            return Err(ApiError::not_found(format!("volume group {} not found", id)));
        }
        let policy = Some(request.protection_policy_id.clone()).filter(|p| !p.is_empty());
        state.assign_policy(id, policy);
        Ok(())
    }

    async fn delete_volume_group(&self, id: &str) -> ApiResult<()> {
        self.record("delete_volume_group", id)?;
        let mut state = self.state.lock();
        state.assign_policy(id, None);
        state
            .volume_groups
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found(format!("volume group {} not found", id)))
    }

    async fn add_members_to_volume_group(&self, id: &str, volume_ids: &[String]) -> ApiResult<()> {
        self.record("add_members_to_volume_group", id)?;
        let mut state = self.state.lock();
        let members: Vec<Volume> = volume_ids
            .iter()
            .map(|v| state.volumes.get(v).cloned().unwrap_or_else(|| volume(v)))
            .collect();
        let group = state
            .volume_groups
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("volume group {} not found", id)))?;
        for member in members {
            if group.volumes.iter().any(|v| v.id == member.id) {
                return Err(ApiError::already_in_use(format!("volume {} already a member", member.id)));
            }
            group.volumes.push(member);
        }
        Ok(())
    }

    async fn create_volume_group_snapshot(
        &self,
        group_id: &str,
        request: &VolumeGroupSnapshotCreate,
    ) -> ApiResult<CreateResponse> {
        self.record("create_volume_group_snapshot", group_id)?;
        let mut state = self.state.lock();
        let source = state
            .volume_groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("volume group {} not found", group_id)))?;

        let id = state.next_id("vgs");
        let snapshots = source
            .volumes
            .iter()
            .enumerate()
            .map(|(i, v)| Volume {
                id: format!("{}-snap-{}", v.id, i),
                name: format!("{}-{}", request.name, i),
                size: v.size,
                state: "Ready".to_string(),
                protection_policy_id: None,
                protection_data: ProtectionData {
                    source_id: v.id.clone(),
                },
            })
            .collect();
        state.volume_groups.insert(
            id.clone(),
            VolumeGroup {
                id: id.clone(),
                name: request.name.clone(),
                description: request.description.clone(),
                protection_policy_id: None,
                creation_timestamp: Some("2024-05-01T10:00:00Z".to_string()),
                volumes: snapshots,
            },
        );
        Ok(CreateResponse { id })
    }

    async fn get_replication_session_by_local_resource_id(
        &self,
        resource_id: &str,
    ) -> ApiResult<ReplicationSession> {
        self.record("get_replication_session_by_local_resource_id", resource_id)?;
        self.session(resource_id)
            .ok_or_else(|| ApiError::not_found(format!("no session for {}", resource_id)))
    }

    async fn execute_action_on_replication_session(
        &self,
        session_id: &str,
        action: SessionAction,
        params: Option<FailoverParams>,
    ) -> ApiResult<()> {
        let argument = match params {
            Some(p) => format!("{}/{}/planned={}", session_id, action, p.is_planned),
            None => format!("{}/{}", session_id, action),
        };
        self.record("execute_action_on_replication_session", &argument)?;

        let mut state = self.state.lock();
        let session = state
            .sessions
            .values_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| ApiError::not_found(format!("session {} not found", session_id)))?;
        session.state = match action {
            SessionAction::Failover => "Failed_Over",
            SessionAction::Pause => "Paused",
            SessionAction::Resume | SessionAction::Reprotect | SessionAction::Sync => "OK",
        }
        .to_string();
        Ok(())
    }

    async fn get_cluster(&self) -> ApiResult<Cluster> {
        self.record("get_cluster", "")?;
        Ok(self.state.lock().cluster.clone())
    }

    async fn get_remote_system(&self, id: &str) -> ApiResult<RemoteSystem> {
        self.record("get_remote_system", id)?;
        self.state
            .lock()
            .remote_systems
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("remote system {} not found", id)))
    }

    async fn get_remote_system_by_name(&self, name: &str) -> ApiResult<RemoteSystem> {
        self.record("get_remote_system_by_name", name)?;
        self.state
            .lock()
            .remote_systems
            .values()
            .find(|r| r.name == name)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("remote system {} not found", name)))
    }

    async fn get_protection_policy_by_name(&self, name: &str) -> ApiResult<ProtectionPolicy> {
        self.record("get_protection_policy_by_name", name)?;
        self.state
            .lock()
            .policies
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("protection policy {} not found", name)))
    }

    async fn create_protection_policy(&self, request: &ProtectionPolicyCreate) -> ApiResult<CreateResponse> {
        self.record("create_protection_policy", &request.name)?;
        let mut state = self.state.lock();
        if state.policies.contains_key(&request.name) {
            return Err(ApiError::already_in_use(format!("name {} already in use", request.name)));
        }
        let id = state.next_id("pp");
        for rule in state.rules.values_mut() {
            if request.replication_rule_ids.contains(&rule.id) {
                rule.protection_policies.push(IdRef { id: id.clone() });
            }
        }
        state.policies.insert(
            request.name.clone(),
            ProtectionPolicy {
                id: id.clone(),
                name: request.name.clone(),
                replication_rules: request
                    .replication_rule_ids
                    .iter()
                    .map(|r| IdRef { id: r.clone() })
                    .collect(),
                ..Default::default()
            },
        );
        Ok(CreateResponse { id })
    }

    async fn delete_protection_policy(&self, id: &str) -> ApiResult<()> {
        self.record("delete_protection_policy", id)?;
        let mut state = self.state.lock();
        let name = state
            .policies
            .values()
            .find(|p| p.id == id)
            .map(|p| p.name.clone())
            .ok_or_else(|| ApiError::not_found(format!("protection policy {} not found", id)))?;
        state.policies.remove(&name);
        for rule in state.rules.values_mut() {
            rule.protection_policies.retain(|p| p.id != id);
        }
        Ok(())
    }

    async fn get_replication_rule_by_name(&self, name: &str) -> ApiResult<ReplicationRule> {
        self.record("get_replication_rule_by_name", name)?;
        self.state
            .lock()
            .rules
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("replication rule {} not found", name)))
    }

    async fn create_replication_rule(&self, request: &ReplicationRuleCreate) -> ApiResult<CreateResponse> {
        self.record("create_replication_rule", &request.name)?;
        let mut state = self.state.lock();
        if state.rules.contains_key(&request.name) {
            return Err(ApiError::already_in_use(format!("name {} already in use", request.name)));
        }
        let id = state.next_id("rr");
        state.rules.insert(
            request.name.clone(),
            ReplicationRule {
                id: id.clone(),
                name: request.name.clone(),
                remote_system_id: request.remote_system_id.clone(),
                protection_policies: Vec::new(),
            },
        );
        Ok(CreateResponse { id })
    }

    async fn delete_replication_rule(&self, id: &str) -> ApiResult<()> {
        self.record("delete_replication_rule", id)?;
        let mut state = self.state.lock();
        let name = state
            .rules
            .values()
            .find(|r| r.id == id)
            .map(|r| r.name.clone())
            .ok_or_else(|| ApiError::not_found(format!("replication rule {} not found", id)))?;
        state.rules.remove(&name);
        Ok(())
    }

    async fn performance_metrics_by_volume(
        &self,
        volume_id: &str,
        _interval: MetricsInterval,
    ) -> ApiResult<Vec<PerformanceSample>> {
        self.record("performance_metrics_by_volume", volume_id)?;
        let reply = self.state.lock().volume_metrics.get(volume_id).cloned();
        Self::metrics_reply(reply, volume_id).await
    }

    async fn performance_metrics_by_filesystem(
        &self,
        filesystem_id: &str,
        _interval: MetricsInterval,
    ) -> ApiResult<Vec<PerformanceSample>> {
        self.record("performance_metrics_by_filesystem", filesystem_id)?;
        let reply = self.state.lock().filesystem_metrics.get(filesystem_id).cloned();
        Self::metrics_reply(reply, filesystem_id).await
    }
}

// =============================================================================
// Mock Client Factory
// =============================================================================

/// Factory handing out mock clients, optionally failing for one array
#[derive(Debug, Default)]
pub struct MockClientFactory {
    fail_for: Option<String>,
    clients: Mutex<HashMap<String, Arc<MockArrayClient>>>,
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(global_id: &str) -> Self {
        Self {
            fail_for: Some(global_id.to_string()),
            ..Default::default()
        }
    }

    /// Client most recently built for an array
    pub fn client(&self, global_id: &str) -> Option<Arc<MockArrayClient>> {
        self.clients.lock().get(global_id).cloned()
    }
}

impl ClientFactory for MockClientFactory {
    fn build(&self, config: &ArrayConfig) -> Result<ArrayClientRef> {
        if self.fail_for.as_deref() == Some(config.global_id.as_str()) {
            return Err(Error::Configuration(format!(
                "can't create client for array {}",
                config.global_id
            )));
        }
        let client = MockArrayClient::new();
        self.clients
            .lock()
            .insert(config.global_id.clone(), client.clone());
        Ok(client)
    }
}

// =============================================================================
// Fake Node Status Server
// =============================================================================

/// Scripted response of the node status endpoint for one array
#[derive(Debug, Clone)]
pub enum NodeStatusReply {
    Status(ArrayConnectivityStatus),
    Raw(u16, String),
}

impl NodeStatusReply {
    /// Connected: attempted and succeeded just now
    pub fn connected() -> Self {
        let now = Utc::now().timestamp();
        NodeStatusReply::Status(ArrayConnectivityStatus {
            last_attempt: now,
            last_success: now,
        })
    }

    /// Last success long before the last attempt
    pub fn stale() -> Self {
        let now = Utc::now().timestamp();
        NodeStatusReply::Status(ArrayConnectivityStatus {
            last_attempt: now,
            last_success: now - 600,
        })
    }
}

/// Serve `/array-status/:id` on an ephemeral local port
pub async fn spawn_node_status_server(replies: HashMap<String, NodeStatusReply>) -> SocketAddr {
    use axum::{extract::Path, http::StatusCode, response::IntoResponse, routing::get, Json, Router};

    let replies = Arc::new(replies);
    let app = Router::new().route(
        "/array-status/:id",
        get(move |Path(id): Path<String>| {
            let replies = replies.clone();
            async move {
                match replies.get(&id) {
                    Some(NodeStatusReply::Status(status)) => Json(*status).into_response(),
                    Some(NodeStatusReply::Raw(code, body)) => (
                        StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                        body.clone(),
                    )
                        .into_response(),
                    None => (StatusCode::NOT_FOUND, "unknown array").into_response(),
                }
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake node status server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Parse an RFC 3339 timestamp in tests
pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}
