//! Volume Group Snapshots
//!
//! Crash-consistent snapshots of a set of volumes taken through a volume
//! group on the owning array.

use super::orchestrator::{tolerate_already_in_use, ReplicationOrchestrator};
use crate::array::Array;
use crate::controlplane::codec::FIELD_SEPARATOR;
use crate::domain::ports::{VolumeGroupCreate, VolumeGroupSnapshotCreate};
use crate::error::{Error, Result};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Longest snapshot group name the array accepts
pub const MAX_SNAPSHOT_GROUP_NAME_LEN: usize = 27;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeGroupSnapshotRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Handles of the volumes to snapshot
    #[serde(default)]
    pub source_volume_ids: Vec<String>,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// One member snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    pub name: String,
    /// Handle of the snapshot volume
    pub snap_id: String,
    pub ready_to_use: bool,
    pub capacity_bytes: i64,
    /// Handle of the volume the snapshot was taken from
    pub source_id: String,
    /// Nanoseconds since the Unix epoch
    pub creation_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeGroupSnapshot {
    pub snapshot_group_id: String,
    pub snapshots: Vec<SnapshotInfo>,
    /// Nanoseconds since the Unix epoch
    pub creation_time: i64,
}

/// Reject snapshot requests the array would refuse
pub fn validate_create_vgs(request: &VolumeGroupSnapshotRequest) -> Result<()> {
    if request.name.is_empty() {
        return Err(Error::Validation(
            "volume group snapshot request needs a name to be set".into(),
        ));
    }
    if request.name.len() > MAX_SNAPSHOT_GROUP_NAME_LEN {
        return Err(Error::Validation(format!(
            "requested name {} longer than {} character max",
            request.name, MAX_SNAPSHOT_GROUP_NAME_LEN
        )));
    }
    if request.source_volume_ids.is_empty() {
        return Err(Error::Validation("source volumes are not present".into()));
    }
    Ok(())
}

impl ReplicationOrchestrator {
    /// Snapshot all source volumes at once through a volume group
    pub async fn create_volume_group_snapshot(
        &self,
        request: &VolumeGroupSnapshotRequest,
    ) -> Result<VolumeGroupSnapshot> {
        validate_create_vgs(request)?;

        let mut handles = Vec::with_capacity(request.source_volume_ids.len());
        for raw in &request.source_volume_ids {
            handles.push(self.codec.decode(raw).await?);
        }
        let first = &handles[0];
        if let Some(other) = handles.iter().find(|h| h.array_id != first.array_id) {
            return Err(Error::Validation(format!(
                "source volumes span arrays {} and {}",
                first.array_id, other.array_id
            )));
        }
        let array = self.codec.registry().get(&first.array_id)?;
        let client = array.client();
        let source_ids: Vec<String> = handles.iter().map(|h| h.local_id.clone()).collect();

        let group_id = match client.get_volume_group_by_name(&request.name).await {
            Ok(group) => {
                let missing: Vec<String> = source_ids
                    .iter()
                    .filter(|id| !group.volumes.iter().any(|v| &v.id == *id))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    tolerate_already_in_use(client.add_members_to_volume_group(&group.id, &missing).await)
                        .map_err(|e| {
                            Error::array_api(array.global_id(), format!("add members to group {}", group.id), e)
                        })?;
                }
                group.id
            }
            Err(e) if e.is_not_found() => self.source_group(&array, &source_ids, request).await?,
            Err(e) => {
                return Err(Error::array_api(
                    array.global_id(),
                    format!("get volume group {}", request.name),
                    e,
                ))
            }
        };

        let snapshot = client
            .create_volume_group_snapshot(
                &group_id,
                &VolumeGroupSnapshotCreate {
                    name: request.name.clone(),
                    description: request.description.clone(),
                },
            )
            .await
            .map_err(|e| {
                if e.is_already_in_use() {
                    Error::Conflict {
                        kind: "volume group snapshot".into(),
                        name: request.name.clone(),
                    }
                } else {
                    Error::array_api(array.global_id(), format!("snapshot volume group {}", group_id), e)
                }
            })?;

        let snapshot_group = client
            .get_volume_group(&snapshot.id)
            .await
            .map_err(|e| Error::array_api(array.global_id(), format!("get snapshot group {}", snapshot.id), e))?;

        let creation_time = snapshot_group
            .creation_timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.timestamp() * 1_000_000_000)
            .unwrap_or_default();

        let handle = |id: &str| {
            format!(
                "{}{sep}{}{sep}{}",
                id,
                array.global_id(),
                first.protocol,
                sep = FIELD_SEPARATOR
            )
        };
        let snapshots = snapshot_group
            .volumes
            .iter()
            .map(|v| SnapshotInfo {
                name: v.name.clone(),
                snap_id: handle(&v.id),
                ready_to_use: v.state == "Ready",
                capacity_bytes: v.size,
                source_id: handle(&v.protection_data.source_id),
                creation_time,
            })
            .collect();

        info!(
            array = %array.global_id(),
            group_id = %group_id,
            snapshot_group_id = %snapshot_group.id,
            "created volume group snapshot"
        );

        Ok(VolumeGroupSnapshot {
            snapshot_group_id: snapshot_group.id,
            snapshots,
            creation_time,
        })
    }

    /// Group holding the first source volume, or a new group of all sources
    async fn source_group(
        &self,
        array: &Array,
        source_ids: &[String],
        request: &VolumeGroupSnapshotRequest,
    ) -> Result<String> {
        let client = array.client();
        let groups = client
            .get_volume_groups_by_volume_id(&source_ids[0])
            .await
            .map_err(|e| Error::array_api(array.global_id(), format!("list groups of volume {}", source_ids[0]), e))?;
        if let Some(group) = groups.into_iter().next() {
            debug!(group_id = %group.id, "snapshotting existing volume group");
            return Ok(group.id);
        }

        let create = VolumeGroupCreate {
            name: request.name.clone(),
            description: request.description.clone(),
            volume_ids: source_ids.to_vec(),
            protection_policy_id: None,
        };
        match client.create_volume_group(&create).await {
            Ok(created) => Ok(created.id),
            Err(e) if e.is_already_in_use() => client
                .get_volume_group_by_name(&request.name)
                .await
                .map(|g| g.id)
                .map_err(|e| Error::array_api(array.global_id(), format!("get volume group {}", request.name), e)),
            Err(e) => Err(Error::array_api(
                array.global_id(),
                format!("create volume group {}", request.name),
                e,
            )),
        }
    }
}
