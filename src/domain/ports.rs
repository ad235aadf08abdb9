//! Domain Ports - Core trait definitions for the control plane
//!
//! These traits define the boundaries between the control plane and the
//! systems it talks to: the array management API, the node-resident status
//! endpoint, and the factory that binds a client to a configured array.

use crate::array::ArrayConfig;
use crate::error::{ApiResult, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Block / File Resources
// =============================================================================

/// Replication bookkeeping attached to a volume
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectionData {
    #[serde(default)]
    pub source_id: String,
}

/// A block volume on the array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub protection_policy_id: Option<String>,
    #[serde(default)]
    pub protection_data: ProtectionData,
}

/// A file system on the array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSystem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size_total: i64,
}

// =============================================================================
// Volume Groups
// =============================================================================

/// A volume group, the unit of replication
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub protection_policy_id: Option<String>,
    #[serde(default)]
    pub creation_timestamp: Option<String>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeGroupCreate {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub volume_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protection_policy_id: Option<String>,
}

/// Modification request; an empty policy ID unassigns the policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeGroupModify {
    pub protection_policy_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeGroupSnapshotCreate {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Identifier returned by create calls
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateResponse {
    pub id: String,
}

/// Reference to a related object by ID
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdRef {
    pub id: String,
}

// =============================================================================
// Replication
// =============================================================================

/// Pairing of a local and remote storage element within a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageElementPair {
    pub local_storage_element_id: String,
    pub remote_storage_element_id: String,
}

/// Replication session as reported by the array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicationSession {
    pub id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub local_resource_id: String,
    #[serde(default)]
    pub remote_resource_id: String,
    #[serde(default)]
    pub remote_system_id: String,
    #[serde(default)]
    pub storage_element_pairs: Vec<StorageElementPair>,
}

/// Administrative action on a replication session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionAction {
    Failover,
    Pause,
    Resume,
    Reprotect,
    Sync,
}

impl SessionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionAction::Failover => "failover",
            SessionAction::Pause => "pause",
            SessionAction::Resume => "resume",
            SessionAction::Reprotect => "reprotect",
            SessionAction::Sync => "sync",
        }
    }
}

impl std::fmt::Display for SessionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverParams {
    pub is_planned: bool,
    pub reverse: bool,
}

/// The local cluster record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub management_address: String,
}

/// A peer system known to the local array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSystem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub management_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectionPolicy {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub volumes: Vec<IdRef>,
    #[serde(default)]
    pub volume_groups: Vec<IdRef>,
    #[serde(default)]
    pub replication_rules: Vec<IdRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectionPolicyCreate {
    pub name: String,
    pub replication_rule_ids: Vec<String>,
}

/// Recovery point objective of a replication rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rpo {
    #[serde(rename = "Five_Minutes")]
    FiveMinutes,
    #[serde(rename = "Fifteen_Minutes")]
    FifteenMinutes,
    #[serde(rename = "Thirty_Minutes")]
    ThirtyMinutes,
    #[serde(rename = "One_Hour")]
    OneHour,
    #[serde(rename = "Six_Hours")]
    SixHours,
    #[serde(rename = "Twelve_Hours")]
    TwelveHours,
    #[serde(rename = "One_Day")]
    OneDay,
}

impl Rpo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rpo::FiveMinutes => "Five_Minutes",
            Rpo::FifteenMinutes => "Fifteen_Minutes",
            Rpo::ThirtyMinutes => "Thirty_Minutes",
            Rpo::OneHour => "One_Hour",
            Rpo::SixHours => "Six_Hours",
            Rpo::TwelveHours => "Twelve_Hours",
            Rpo::OneDay => "One_Day",
        }
    }
}

impl std::str::FromStr for Rpo {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Five_Minutes" => Ok(Rpo::FiveMinutes),
            "Fifteen_Minutes" => Ok(Rpo::FifteenMinutes),
            "Thirty_Minutes" => Ok(Rpo::ThirtyMinutes),
            "One_Hour" => Ok(Rpo::OneHour),
            "Six_Hours" => Ok(Rpo::SixHours),
            "Twelve_Hours" => Ok(Rpo::TwelveHours),
            "One_Day" => Ok(Rpo::OneDay),
            other => Err(crate::error::Error::Validation(format!("unsupported RPO: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicationRule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub remote_system_id: String,
    /// Protection policies referencing this rule
    #[serde(default, rename = "policies")]
    pub protection_policies: Vec<IdRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationRuleCreate {
    pub name: String,
    pub rpo: Rpo,
    pub remote_system_id: String,
}

// =============================================================================
// Performance Metrics
// =============================================================================

/// Sampling interval of a metrics series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricsInterval {
    #[serde(rename = "Twenty_Sec")]
    TwentySec,
    #[serde(rename = "Five_Mins")]
    FiveMins,
}

/// One sample of a per-volume or per-filesystem performance series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_iops: f64,
}

// =============================================================================
// Array Client Port
// =============================================================================

/// Port for the array management API
#[async_trait]
pub trait ArrayClient: Send + Sync {
    async fn get_volume(&self, id: &str) -> ApiResult<Volume>;

    async fn delete_volume(&self, id: &str) -> ApiResult<()>;

    async fn get_filesystem(&self, id: &str) -> ApiResult<FileSystem>;

    async fn get_volume_group(&self, id: &str) -> ApiResult<VolumeGroup>;

    async fn get_volume_group_by_name(&self, name: &str) -> ApiResult<VolumeGroup>;

    /// Groups the volume is a member of (empty when none)
    async fn get_volume_groups_by_volume_id(&self, volume_id: &str) -> ApiResult<Vec<VolumeGroup>>;

    async fn create_volume_group(&self, request: &VolumeGroupCreate) -> ApiResult<CreateResponse>;

    async fn modify_volume_group(&self, id: &str, request: &VolumeGroupModify) -> ApiResult<()>;

    async fn delete_volume_group(&self, id: &str) -> ApiResult<()>;

    async fn add_members_to_volume_group(&self, id: &str, volume_ids: &[String]) -> ApiResult<()>;

    async fn create_volume_group_snapshot(
        &self,
        group_id: &str,
        request: &VolumeGroupSnapshotCreate,
    ) -> ApiResult<CreateResponse>;

    async fn get_replication_session_by_local_resource_id(
        &self,
        resource_id: &str,
    ) -> ApiResult<ReplicationSession>;

    async fn execute_action_on_replication_session(
        &self,
        session_id: &str,
        action: SessionAction,
        params: Option<FailoverParams>,
    ) -> ApiResult<()>;

    async fn get_cluster(&self) -> ApiResult<Cluster>;

    async fn get_remote_system(&self, id: &str) -> ApiResult<RemoteSystem>;

    async fn get_remote_system_by_name(&self, name: &str) -> ApiResult<RemoteSystem>;

    async fn get_protection_policy_by_name(&self, name: &str) -> ApiResult<ProtectionPolicy>;

    async fn create_protection_policy(&self, request: &ProtectionPolicyCreate) -> ApiResult<CreateResponse>;

    async fn delete_protection_policy(&self, id: &str) -> ApiResult<()>;

    async fn get_replication_rule_by_name(&self, name: &str) -> ApiResult<ReplicationRule>;

    async fn create_replication_rule(&self, request: &ReplicationRuleCreate) -> ApiResult<CreateResponse>;

    async fn delete_replication_rule(&self, id: &str) -> ApiResult<()>;

    async fn performance_metrics_by_volume(
        &self,
        volume_id: &str,
        interval: MetricsInterval,
    ) -> ApiResult<Vec<PerformanceSample>>;

    async fn performance_metrics_by_filesystem(
        &self,
        filesystem_id: &str,
        interval: MetricsInterval,
    ) -> ApiResult<Vec<PerformanceSample>>;
}

// =============================================================================
// Node Status Port
// =============================================================================

/// Body served by the node-resident status endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayConnectivityStatus {
    /// Unix seconds of the last connectivity attempt
    pub last_attempt: i64,
    /// Unix seconds of the last successful attempt
    pub last_success: i64,
}

/// Port for querying a node's view of array connectivity
#[async_trait]
pub trait NodeStatusClient: Send + Sync {
    async fn array_status(&self, node_ip: &str, global_id: &str) -> Result<ArrayConnectivityStatus>;
}

// =============================================================================
// Client Factory Port
// =============================================================================

/// Binds an API client to a configured array
pub trait ClientFactory: Send + Sync {
    fn build(&self, config: &ArrayConfig) -> Result<ArrayClientRef>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ArrayClientRef = Arc<dyn ArrayClient>;
pub type NodeStatusClientRef = Arc<dyn NodeStatusClient>;
