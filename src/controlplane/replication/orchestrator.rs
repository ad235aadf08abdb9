//! Replication Orchestrator
//!
//! Drives the replication lifecycle of volume groups on the arrays:
//! protection group create/adopt, remote volume discovery, session actions,
//! status reporting and teardown.

use super::state::{
    decide, is_source_role, ActionDecision, ActionType, ProtectionGroupState,
    ProtectionGroupStatus, ReplicationAction, ReplicationCapabilities, SessionState,
};
use crate::array::Array;
use crate::controlplane::codec::{Protocol, VolumeHandleCodec, FIELD_SEPARATOR};
use crate::domain::ports::{
    ProtectionPolicyCreate, ReplicationRuleCreate, ReplicationSession, Rpo, VolumeGroup,
    VolumeGroupCreate, VolumeGroupModify,
};
use crate::error::{ApiResult, Error, Result};
use crate::metrics::ControllerMetrics;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attribute map exchanged with the replication sidecar
pub type Attributes = BTreeMap<String, String>;

/// Name prefix of protection policies created for a group
pub const POLICY_PREFIX: &str = "pp-";

/// Name prefix of replication rules created for a group
pub const RULE_PREFIX: &str = "rr-";

// Parameter and attribute keys, qualified by the context prefix
pub const KEY_REMOTE_SYSTEM: &str = "remoteSystem";
pub const KEY_RPO: &str = "rpo";
pub const KEY_VOLUME_GROUP_PREFIX: &str = "volumeGroupPrefix";
pub const KEY_SYSTEM_NAME: &str = "systemName";
pub const KEY_MANAGEMENT_ADDRESS: &str = "managementAddress";
pub const KEY_REMOTE_SYSTEM_NAME: &str = "remoteSystemName";
pub const KEY_REMOTE_MANAGEMENT_ADDRESS: &str = "remoteManagementAddress";
pub const KEY_GLOBAL_ID: &str = "globalID";
pub const KEY_REMOTE_GLOBAL_ID: &str = "remoteGlobalID";
pub const KEY_VOLUME_GROUP_NAME: &str = "VolumeGroupName";
pub const KEY_ARRAY_ID: &str = "arrayID";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the replication orchestrator
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Prefix qualifying parameter and attribute keys
    pub context_prefix: String,
    /// Group name prefix when the request does not carry one
    pub default_group_prefix: String,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            context_prefix: "replication.storage/".to_string(),
            default_group_prefix: "csi".to_string(),
        }
    }
}

impl ReplicationConfig {
    /// Key qualified by the context prefix
    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.context_prefix, name)
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Result of creating or adopting a protection group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionGroup {
    pub local_protection_group_id: String,
    pub remote_protection_group_id: String,
    pub local_attributes: Attributes,
    pub remote_attributes: Attributes,
}

/// The remote counterpart of a replicated volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteVolumeInfo {
    /// Handle of the remote volume
    pub volume_id: String,
    pub capacity_bytes: i64,
    pub context: Attributes,
}

/// Result of an executed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action: ActionType,
    pub decision: ActionDecision,
    pub status: ProtectionGroupStatus,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Replication lifecycle operations against the registered arrays
#[derive(Debug, Clone)]
pub struct ReplicationOrchestrator {
    pub(super) codec: VolumeHandleCodec,
    pub(super) config: ReplicationConfig,
    pub(super) metrics: Arc<ControllerMetrics>,
}

impl ReplicationOrchestrator {
    /// Create a new orchestrator
    pub fn new(codec: VolumeHandleCodec, config: ReplicationConfig, metrics: Arc<ControllerMetrics>) -> Self {
        Self { codec, config, metrics }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Calls and actions this service supports
    pub fn get_replication_capabilities(&self) -> ReplicationCapabilities {
        ReplicationCapabilities::default()
    }

    // =========================================================================
    // Protection Groups
    // =========================================================================

    /// Create a protection group for a volume, or adopt the one it is in
    pub async fn create_storage_protection_group(
        &self,
        volume_handle: &str,
        params: &HashMap<String, String>,
    ) -> Result<ProtectionGroup> {
        if volume_handle.is_empty() {
            return Err(Error::Validation("volume ID is required".into()));
        }

        let handle = self.codec.decode(volume_handle).await?;
        if handle.protocol == Protocol::Nfs {
            return Err(Error::Validation(
                "replication is not supported for NFS volumes".into(),
            ));
        }
        let (_, volume_id) = handle.array_volume_id(params);
        let array = self.codec.registry().get(&handle.array_id)?;
        let client = array.client();

        let groups = client
            .get_volume_groups_by_volume_id(volume_id)
            .await
            .map_err(|e| Error::array_api(array.global_id(), format!("list groups of volume {}", volume_id), e))?;

        let group = match groups.into_iter().next() {
            Some(group) => {
                debug!(volume_id, group_id = %group.id, "volume already belongs to a group");
                group
            }
            None => self.create_or_adopt_group(&array, volume_id, params).await?,
        };

        let session = self.session(&array, &group.id).await?;
        let cluster = client
            .get_cluster()
            .await
            .map_err(|e| Error::array_api(array.global_id(), "get cluster", e))?;
        let remote = client
            .get_remote_system(&session.remote_system_id)
            .await
            .map_err(|e| {
                Error::array_api(
                    array.global_id(),
                    format!("get remote system {}", session.remote_system_id),
                    e,
                )
            })?;

        let attr = |pairs: [(&str, &str); 7]| -> Attributes {
            pairs
                .into_iter()
                .map(|(k, v)| (self.config.key(k), v.to_string()))
                .collect()
        };
        let local_attributes = attr([
            (KEY_SYSTEM_NAME, cluster.name.as_str()),
            (KEY_MANAGEMENT_ADDRESS, cluster.management_address.as_str()),
            (KEY_REMOTE_SYSTEM_NAME, remote.name.as_str()),
            (KEY_REMOTE_MANAGEMENT_ADDRESS, remote.management_address.as_str()),
            (KEY_GLOBAL_ID, array.global_id()),
            (KEY_REMOTE_GLOBAL_ID, remote.serial_number.as_str()),
            (KEY_VOLUME_GROUP_NAME, group.name.as_str()),
        ]);
        let remote_attributes = attr([
            (KEY_SYSTEM_NAME, remote.name.as_str()),
            (KEY_MANAGEMENT_ADDRESS, remote.management_address.as_str()),
            (KEY_REMOTE_SYSTEM_NAME, cluster.name.as_str()),
            (KEY_REMOTE_MANAGEMENT_ADDRESS, cluster.management_address.as_str()),
            (KEY_GLOBAL_ID, remote.serial_number.as_str()),
            (KEY_REMOTE_GLOBAL_ID, array.global_id()),
            (KEY_VOLUME_GROUP_NAME, group.name.as_str()),
        ]);

        info!(
            array = %array.global_id(),
            group_id = %group.id,
            session_id = %session.id,
            "protection group ready"
        );

        Ok(ProtectionGroup {
            local_protection_group_id: session.local_resource_id,
            remote_protection_group_id: session.remote_resource_id,
            local_attributes,
            remote_attributes,
        })
    }

    /// Create the group named after the request parameters; a group already
    /// holding that name is adopted and the volume added to it
    async fn create_or_adopt_group(
        &self,
        array: &Array,
        volume_id: &str,
        params: &HashMap<String, String>,
    ) -> Result<VolumeGroup> {
        let remote_system = self
            .param(params, KEY_REMOTE_SYSTEM)
            .ok_or_else(|| Error::Validation(format!("missing {} parameter", KEY_REMOTE_SYSTEM)))?;
        let rpo: Rpo = self
            .param(params, KEY_RPO)
            .ok_or_else(|| Error::Validation(format!("missing {} parameter", KEY_RPO)))?
            .parse()?;
        let prefix = self
            .param(params, KEY_VOLUME_GROUP_PREFIX)
            .unwrap_or(self.config.default_group_prefix.as_str());
        let group_name = format!("{}-{}-{}", prefix, remote_system, rpo.as_str());

        let policy_id = self
            .ensure_protection_policy_exists(array, &group_name, remote_system, rpo)
            .await?;

        let client = array.client();
        let request = VolumeGroupCreate {
            name: group_name.clone(),
            description: String::new(),
            volume_ids: vec![volume_id.to_string()],
            protection_policy_id: Some(policy_id),
        };

        let group_id = match client.create_volume_group(&request).await {
            Ok(created) => {
                info!(array = %array.global_id(), group = %group_name, "created volume group");
                created.id
            }
            Err(e) if e.is_already_in_use() => {
                let existing = client
                    .get_volume_group_by_name(&group_name)
                    .await
                    .map_err(|e| Error::array_api(array.global_id(), format!("get volume group {}", group_name), e))?;
                info!(array = %array.global_id(), group = %group_name, "adopting existing volume group");
                tolerate_already_in_use(
                    client
                        .add_members_to_volume_group(&existing.id, &[volume_id.to_string()])
                        .await,
                )
                .map_err(|e| Error::array_api(array.global_id(), format!("add volume to group {}", existing.id), e))?;
                existing.id
            }
            Err(e) => {
                return Err(Error::array_api(
                    array.global_id(),
                    format!("create volume group {}", group_name),
                    e,
                ))
            }
        };

        client
            .get_volume_group(&group_id)
            .await
            .map_err(|e| Error::array_api(array.global_id(), format!("get volume group {}", group_id), e))
    }

    /// Return the ID of the group's protection policy, creating it (and its
    /// replication rule) when missing
    pub async fn ensure_protection_policy_exists(
        &self,
        array: &Array,
        group_name: &str,
        remote_system_name: &str,
        rpo: Rpo,
    ) -> Result<String> {
        let client = array.client();
        let remote = client
            .get_remote_system_by_name(remote_system_name)
            .await
            .map_err(|e| Error::array_api(array.global_id(), format!("get remote system {}", remote_system_name), e))?;

        let policy_name = format!("{}{}", POLICY_PREFIX, group_name);
        match client.get_protection_policy_by_name(&policy_name).await {
            Ok(policy) => return Ok(policy.id),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                return Err(Error::array_api(
                    array.global_id(),
                    format!("get protection policy {}", policy_name),
                    e,
                ))
            }
        }

        let rule_id = self
            .ensure_replication_rule_exists(array, group_name, &remote.id, rpo)
            .await?;

        let request = ProtectionPolicyCreate {
            name: policy_name.clone(),
            replication_rule_ids: vec![rule_id],
        };
        match client.create_protection_policy(&request).await {
            Ok(created) => {
                info!(array = %array.global_id(), policy = %policy_name, "created protection policy");
                Ok(created.id)
            }
            Err(e) if e.is_already_in_use() => client
                .get_protection_policy_by_name(&policy_name)
                .await
                .map(|p| p.id)
                .map_err(|e| Error::array_api(array.global_id(), format!("get protection policy {}", policy_name), e)),
            Err(e) => Err(Error::array_api(
                array.global_id(),
                format!("create protection policy {}", policy_name),
                e,
            )),
        }
    }

    /// Return the ID of the group's replication rule, creating it when missing
    pub async fn ensure_replication_rule_exists(
        &self,
        array: &Array,
        group_name: &str,
        remote_system_id: &str,
        rpo: Rpo,
    ) -> Result<String> {
        let client = array.client();
        let rule_name = format!("{}{}", RULE_PREFIX, group_name);
        match client.get_replication_rule_by_name(&rule_name).await {
            Ok(rule) => return Ok(rule.id),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                return Err(Error::array_api(
                    array.global_id(),
                    format!("get replication rule {}", rule_name),
                    e,
                ))
            }
        }

        let request = ReplicationRuleCreate {
            name: rule_name.clone(),
            rpo,
            remote_system_id: remote_system_id.to_string(),
        };
        match client.create_replication_rule(&request).await {
            Ok(created) => {
                info!(array = %array.global_id(), rule = %rule_name, rpo = rpo.as_str(), "created replication rule");
                Ok(created.id)
            }
            Err(e) if e.is_already_in_use() => client
                .get_replication_rule_by_name(&rule_name)
                .await
                .map(|r| r.id)
                .map_err(|e| Error::array_api(array.global_id(), format!("get replication rule {}", rule_name), e)),
            Err(e) => Err(Error::array_api(
                array.global_id(),
                format!("create replication rule {}", rule_name),
                e,
            )),
        }
    }

    // =========================================================================
    // Remote Volumes
    // =========================================================================

    /// Locate the remote counterpart of a replicated volume
    pub async fn create_remote_volume(
        &self,
        volume_handle: &str,
        params: &HashMap<String, String>,
    ) -> Result<RemoteVolumeInfo> {
        let handle = self.codec.decode(volume_handle).await?;
        let (volume_prefix, volume_id) = handle.array_volume_id(params);
        let array = self.codec.registry().get(&handle.array_id)?;
        let client = array.client();

        let groups = client
            .get_volume_groups_by_volume_id(volume_id)
            .await
            .map_err(|e| Error::array_api(array.global_id(), format!("list groups of volume {}", volume_id), e))?;
        let group = groups.into_iter().next().ok_or_else(|| {
            Error::Unimplemented(
                "replication of volumes that aren't assigned to a group is not implemented".into(),
            )
        })?;

        let session = self.session(&array, &group.id).await?;
        let remote_id = session
            .storage_element_pairs
            .iter()
            .find(|pair| pair.local_storage_element_id == volume_id)
            .map(|pair| pair.remote_storage_element_id.clone())
            .ok_or_else(|| {
                Error::Internal(format!(
                    "couldn't find volume id {} in storage element pairs of replication session {}",
                    volume_id, session.id
                ))
            })?;

        let volume = client
            .get_volume(volume_id)
            .await
            .map_err(|e| Error::array_api(array.global_id(), format!("get volume {}", volume_id), e))?;
        let cluster = client
            .get_cluster()
            .await
            .map_err(|e| Error::array_api(array.global_id(), "get cluster", e))?;
        let remote = client
            .get_remote_system(&session.remote_system_id)
            .await
            .map_err(|e| {
                Error::array_api(
                    array.global_id(),
                    format!("get remote system {}", session.remote_system_id),
                    e,
                )
            })?;

        let mut context = Attributes::new();
        context.insert(KEY_REMOTE_SYSTEM.to_string(), cluster.name);
        context.insert(self.config.key(KEY_ARRAY_ID), remote.serial_number.clone());
        context.insert(self.config.key(KEY_MANAGEMENT_ADDRESS), remote.management_address);

        let remote_handle = format!(
            "{}{}{sep}{}{sep}{}",
            volume_prefix,
            remote_id,
            remote.serial_number,
            handle.protocol,
            sep = FIELD_SEPARATOR
        );
        debug!(volume_id, remote_handle = %remote_handle, "resolved remote volume");

        Ok(RemoteVolumeInfo {
            volume_id: remote_handle,
            capacity_bytes: volume.size,
            context,
        })
    }

    // =========================================================================
    // Actions and Status
    // =========================================================================

    /// Execute an action on the session protecting a group
    pub async fn execute_action(
        &self,
        group_id: &str,
        attributes: &Attributes,
        action: ActionType,
    ) -> Result<ActionResult> {
        let array = self.array_from_attributes(attributes)?;
        let session = self.session(&array, group_id).await?;

        let decision = self.apply_action(&array, &session, action.into()).await?;
        let status = self.group_status(&array, group_id).await?;

        Ok(ActionResult {
            action,
            decision,
            status,
        })
    }

    /// Apply one action to a session according to the decision table
    pub async fn apply_action(
        &self,
        array: &Array,
        session: &ReplicationSession,
        action: ReplicationAction,
    ) -> Result<ActionDecision> {
        let state = SessionState::from(session.state.as_str());
        let action_name = action.to_string();
        let decision = decide(&state, action);

        match decision {
            ActionDecision::AlreadyInDesiredState => {
                info!(
                    session_id = %session.id,
                    state = %state,
                    action = %action_name,
                    "replication session already in desired state"
                );
                self.metrics.record_replication_action(&action_name, "skipped");
            }
            ActionDecision::StillExecuting => {
                warn!(session_id = %session.id, state = %state, action = %action_name, "previous action still running");
                self.metrics.record_replication_action(&action_name, "still_executing");
                return Err(Error::Precondition(format!(
                    "execute action: replication session {} is still executing previous action",
                    session.id
                )));
            }
            ActionDecision::Issue => {
                let result = array
                    .client()
                    .execute_action_on_replication_session(
                        &session.id,
                        action.session_action(),
                        action.failover_params(),
                    )
                    .await;
                if let Err(e) = result {
                    self.metrics.record_replication_action(&action_name, "failed");
                    if e.is_failover_from_destination() {
                        return Err(Error::Internal(format!(
                            "execute action: failed to modify replication session {} on array {}: {}",
                            session.id,
                            array.global_id(),
                            e
                        )));
                    }
                    return Err(Error::array_api(
                        array.global_id(),
                        format!("{} replication session {}", action_name, session.id),
                        e,
                    ));
                }
                info!(session_id = %session.id, state = %state, action = %action_name, "issued replication action");
                self.metrics.record_replication_action(&action_name, "issued");
            }
        }

        Ok(decision)
    }

    /// Current status of a protection group
    pub async fn get_storage_protection_group_status(
        &self,
        group_id: &str,
        attributes: &Attributes,
    ) -> Result<ProtectionGroupStatus> {
        let array = self.array_from_attributes(attributes)?;
        self.group_status(&array, group_id).await
    }

    async fn group_status(&self, array: &Array, group_id: &str) -> Result<ProtectionGroupStatus> {
        let session = self.session(array, group_id).await?;
        let status = ProtectionGroupStatus {
            state: ProtectionGroupState::from(&SessionState::from(session.state.as_str())),
            is_source: is_source_role(&session.role),
        };
        debug!(group_id, state = %status.state, is_source = status.is_source, "protection group status");
        Ok(status)
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Remove a protection group with its policy and rule when nothing else
    /// uses them
    pub async fn delete_storage_protection_group(&self, group_id: &str, attributes: &Attributes) -> Result<()> {
        let array = self.array_from_attributes(attributes)?;
        let client = array.client();
        let group_name = attributes
            .get(&self.config.key(KEY_VOLUME_GROUP_NAME))
            .ok_or_else(|| Error::Validation("missing volume group name in protection group attributes".into()))?;

        match client.get_volume_group(group_id).await {
            Ok(group) => {
                if group.protection_policy_id.as_deref().is_some_and(|p| !p.is_empty()) {
                    let unassign = VolumeGroupModify {
                        protection_policy_id: String::new(),
                    };
                    tolerate_not_found(client.modify_volume_group(group_id, &unassign).await).map_err(|e| {
                        Error::array_api(array.global_id(), format!("unassign policy from group {}", group_id), e)
                    })?;
                }
                tolerate_not_found(client.delete_volume_group(group_id).await)
                    .map_err(|e| Error::array_api(array.global_id(), format!("delete volume group {}", group_id), e))?;
                info!(array = %array.global_id(), group_id, "deleted volume group");
            }
            Err(e) if e.is_not_found() => {
                debug!(group_id, "volume group already gone");
            }
            Err(e) => {
                return Err(Error::array_api(
                    array.global_id(),
                    format!("get volume group {}", group_id),
                    e,
                ))
            }
        }

        let policy_name = format!("{}{}", POLICY_PREFIX, group_name);
        match client.get_protection_policy_by_name(&policy_name).await {
            Ok(policy) if policy.volumes.is_empty() && policy.volume_groups.is_empty() => {
                tolerate_not_found(client.delete_protection_policy(&policy.id).await).map_err(|e| {
                    Error::array_api(array.global_id(), format!("delete protection policy {}", policy_name), e)
                })?;
                info!(array = %array.global_id(), policy = %policy_name, "deleted protection policy");
            }
            Ok(policy) => {
                info!(
                    policy = %policy_name,
                    volumes = policy.volumes.len(),
                    groups = policy.volume_groups.len(),
                    "protection policy still in use, keeping it"
                );
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                return Err(Error::array_api(
                    array.global_id(),
                    format!("get protection policy {}", policy_name),
                    e,
                ))
            }
        }

        let rule_name = format!("{}{}", RULE_PREFIX, group_name);
        match client.get_replication_rule_by_name(&rule_name).await {
            Ok(rule) if rule.protection_policies.is_empty() => {
                tolerate_not_found(client.delete_replication_rule(&rule.id).await).map_err(|e| {
                    Error::array_api(array.global_id(), format!("delete replication rule {}", rule_name), e)
                })?;
                info!(array = %array.global_id(), rule = %rule_name, "deleted replication rule");
            }
            Ok(rule) => {
                info!(
                    rule = %rule_name,
                    policies = rule.protection_policies.len(),
                    "replication rule still in use, keeping it"
                );
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                return Err(Error::array_api(
                    array.global_id(),
                    format!("get replication rule {}", rule_name),
                    e,
                ))
            }
        }

        Ok(())
    }

    /// Delete a standalone volume on the array named by its handle
    pub async fn delete_local_volume(&self, volume_handle: &str) -> Result<()> {
        let fields: Vec<&str> = volume_handle.split(FIELD_SEPARATOR).collect();
        let [volume_id, global_id, _protocol] = fields.as_slice() else {
            return Err(Error::Validation(format!(
                "can't delete volume of improper handle format: {}",
                volume_handle
            )));
        };

        let array = self.codec.registry().get(global_id)?;
        let client = array.client();

        let volume = match client.get_volume(volume_id).await {
            Ok(volume) => volume,
            Err(e) if e.is_not_found() => {
                debug!(volume_id, "volume already gone");
                return Ok(());
            }
            Err(e) => {
                return Err(Error::array_api(
                    array.global_id(),
                    format!("get volume {}", volume_id),
                    e,
                ))
            }
        };

        let groups = tolerate_not_found(client.get_volume_groups_by_volume_id(volume_id).await)
            .map_err(|e| Error::array_api(array.global_id(), format!("list groups of volume {}", volume_id), e))?
            .unwrap_or_default();
        if !groups.is_empty() {
            return Err(Error::Precondition(format!(
                "unable to delete volume {}: it is a member of volume group {}",
                volume_id, groups[0].id
            )));
        }
        if volume.protection_policy_id.as_deref().is_some_and(|p| !p.is_empty()) {
            return Err(Error::Precondition(format!(
                "unable to delete volume {}: it is assigned to a protection policy",
                volume_id
            )));
        }

        tolerate_not_found(client.delete_volume(volume_id).await)
            .map_err(|e| Error::array_api(array.global_id(), format!("delete volume {}", volume_id), e))?;
        info!(array = %array.global_id(), volume_id, "deleted volume");
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// A request parameter, qualified or bare
    fn param<'a>(&self, params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
        params
            .get(&self.config.key(name))
            .or_else(|| params.get(name))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn array_from_attributes(&self, attributes: &Attributes) -> Result<Arc<Array>> {
        let global_id = attributes
            .get(&self.config.key(KEY_GLOBAL_ID))
            .ok_or_else(|| Error::Validation("missing globalID in protection group attributes".into()))?;
        self.codec.registry().get(global_id)
    }

    async fn session(&self, array: &Array, group_id: &str) -> Result<ReplicationSession> {
        array
            .client()
            .get_replication_session_by_local_resource_id(group_id)
            .await
            .map_err(|e| Error::array_api(array.global_id(), format!("get replication session of {}", group_id), e))
    }
}

/// Map a not-found failure to `None`
pub(super) fn tolerate_not_found<T>(result: ApiResult<T>) -> ApiResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Map an already-in-use failure to success
pub(super) fn tolerate_already_in_use(result: ApiResult<()>) -> ApiResult<()> {
    match result {
        Err(e) if e.is_already_in_use() => Ok(()),
        other => other,
    }
}
