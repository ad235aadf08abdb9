//! Volume Handle
//!
//! The composite volume identifier handed to the orchestrator:
//!
//! ```text
//! localID/arrayRef/protocol[:remoteID/remoteArrayID[/remoteProtocol]]
//! ```
//!
//! The encoded form is persisted by the orchestrator and must never change
//! for a given handle.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Separates the local and remote halves of a metro handle
pub const REMOTE_SEPARATOR: char = ':';

/// Separates fields within one half
pub const FIELD_SEPARATOR: char = '/';

/// Parameter marking host-based NFS volumes
pub const CSI_NFS_PARAMETER: &str = "csi-nfs";

/// Prefix carried by host-based NFS volume IDs
pub const NFS_VOLUME_PREFIX: &str = "nfs-";

// =============================================================================
// Protocol
// =============================================================================

/// Access protocol of a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Block volume
    Scsi,
    /// File system
    Nfs,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Scsi => "scsi",
            Protocol::Nfs => "nfs",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scsi" => Ok(Protocol::Scsi),
            "nfs" => Ok(Protocol::Nfs),
            other => Err(Error::Validation(format!("unknown volume protocol: {:?}", other))),
        }
    }
}

// =============================================================================
// Volume Handle
// =============================================================================

/// Remote half of a metro volume handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteVolume {
    pub volume_id: String,
    pub array_id: String,
    /// Present only when the handle spells it out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

/// Decoded volume identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeHandle {
    pub local_id: String,
    /// GlobalID of the owning array
    pub array_id: String,
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteVolume>,
}

impl VolumeHandle {
    /// Create a new handle for a non-replicated volume
    pub fn new(local_id: impl Into<String>, array_id: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            local_id: local_id.into(),
            array_id: array_id.into(),
            protocol,
            remote: None,
        }
    }

    /// Attach the remote half of a metro pair
    pub fn with_remote(
        mut self,
        volume_id: impl Into<String>,
        array_id: impl Into<String>,
        protocol: Option<Protocol>,
    ) -> Self {
        self.remote = Some(RemoteVolume {
            volume_id: volume_id.into(),
            array_id: array_id.into(),
            protocol,
        });
        self
    }

    pub fn is_metro(&self) -> bool {
        self.remote.is_some()
    }

    /// Encoded form
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Local ID with the host-based NFS prefix removed when the request
    /// parameters mark the volume as such.
    ///
    /// Returns `(prefix, id)`; the prefix is empty when nothing was stripped.
    pub fn array_volume_id(&self, params: &HashMap<String, String>) -> (&str, &str) {
        let host_nfs = params
            .get(CSI_NFS_PARAMETER)
            .map(|v| !v.is_empty())
            .unwrap_or(false);

        match self.local_id.strip_prefix(NFS_VOLUME_PREFIX) {
            Some(id) if host_nfs => (NFS_VOLUME_PREFIX, id),
            _ => ("", &self.local_id),
        }
    }
}

impl std::fmt::Display for VolumeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.local_id, self.array_id, self.protocol)?;
        if let Some(remote) = &self.remote {
            write!(f, "{}{}/{}", REMOTE_SEPARATOR, remote.volume_id, remote.array_id)?;
            if let Some(protocol) = remote.protocol {
                write!(f, "/{}", protocol)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_local() {
        let handle = VolumeHandle::new("39bb1b5f", "PS0001", Protocol::Scsi);
        assert_eq!(handle.encode(), "39bb1b5f/PS0001/scsi");
        assert!(!handle.is_metro());
    }

    #[test]
    fn test_encode_metro() {
        let handle = VolumeHandle::new("39bb1b5f", "PS0001", Protocol::Scsi).with_remote("9f84", "PS0002", None);
        assert_eq!(handle.encode(), "39bb1b5f/PS0001/scsi:9f84/PS0002");

        let handle = handle.with_remote("9f84", "PS0002", Some(Protocol::Scsi));
        assert_eq!(handle.encode(), "39bb1b5f/PS0001/scsi:9f84/PS0002/scsi");
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!("nfs".parse::<Protocol>().unwrap(), Protocol::Nfs);
        assert!("NFS".parse::<Protocol>().is_err());
        assert!("iscsi".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_host_nfs_prefix() {
        let handle = VolumeHandle::new("nfs-39bb1b5f", "PS0001", Protocol::Nfs);
        let mut params = HashMap::new();
        assert_eq!(handle.array_volume_id(&params), ("", "nfs-39bb1b5f"));

        params.insert(CSI_NFS_PARAMETER.to_string(), "RWX".to_string());
        assert_eq!(handle.array_volume_id(&params), ("nfs-", "39bb1b5f"));
    }
}
