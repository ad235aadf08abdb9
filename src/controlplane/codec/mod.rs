//! Volume Handle Codec
//!
//! Parses and formats the composite volume identifier. The array reference
//! of a handle is either a GlobalID or, for handles minted by older
//! releases, the array's management IP. Bare IDs without any array
//! reference are handed to the [`LegacyClassifier`].

pub mod handle;
pub mod legacy;

pub use handle::*;
pub use legacy::*;

use crate::array::{ipv4_addresses, Array, ArrayRegistry};
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Outcome of the synchronous parse step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedHandle {
    /// Fully addressed handle
    Structured(VolumeHandle),
    /// Bare volume ID that still needs classification
    Legacy { volume_id: String },
}

/// Encoder/decoder for volume handles
#[derive(Debug, Clone)]
pub struct VolumeHandleCodec {
    registry: Arc<ArrayRegistry>,
    classifier: LegacyClassifier,
}

impl VolumeHandleCodec {
    /// Create a new codec resolving array references through `registry`
    pub fn new(registry: Arc<ArrayRegistry>) -> Self {
        Self {
            classifier: LegacyClassifier::new(registry.clone()),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<ArrayRegistry> {
        &self.registry
    }

    /// Parse a handle without contacting any array
    pub fn parse_structured(&self, raw: &str) -> Result<ParsedHandle> {
        if raw.is_empty() {
            return Err(Error::Validation(
                "unable to parse volume handle. volumeHandle is empty".into(),
            ));
        }

        let mut halves = raw.split(REMOTE_SEPARATOR);
        let local = halves.next().unwrap_or_default();
        let remote = halves.next();
        if halves.next().is_some() {
            return Err(malformed(raw, "more than one remote segment"));
        }

        let fields: Vec<&str> = local.split(FIELD_SEPARATOR).collect();
        let handle = match fields.as_slice() {
            [volume_id] => {
                if remote.is_some() {
                    return Err(malformed(raw, "remote segment on a legacy volume ID"));
                }
                if volume_id.is_empty() {
                    return Err(malformed(raw, "empty volume ID"));
                }
                return Ok(ParsedHandle::Legacy {
                    volume_id: volume_id.to_string(),
                });
            }
            [volume_id, array_ref, protocol] => {
                if volume_id.is_empty() {
                    return Err(malformed(raw, "empty volume ID"));
                }
                let array = self.resolve(array_ref)?;
                VolumeHandle::new(*volume_id, array.global_id(), protocol.parse()?)
            }
            _ => return Err(malformed(raw, "expected localID/arrayID/protocol")),
        };

        let handle = match remote {
            None => handle,
            Some(segment) => {
                let fields: Vec<&str> = segment.split(FIELD_SEPARATOR).collect();
                match fields.as_slice() {
                    [volume_id, array_id] if !volume_id.is_empty() && !array_id.is_empty() => {
                        handle.with_remote(*volume_id, *array_id, None)
                    }
                    [volume_id, array_id, protocol] if !volume_id.is_empty() && !array_id.is_empty() => {
                        handle.with_remote(*volume_id, *array_id, Some(protocol.parse()?))
                    }
                    _ => return Err(malformed(raw, "expected remoteID/remoteArrayID[/protocol]")),
                }
            }
        };

        Ok(ParsedHandle::Structured(handle))
    }

    /// Decode a handle, classifying legacy IDs against the default array
    pub async fn decode(&self, raw: &str) -> Result<VolumeHandle> {
        match self.parse_structured(raw)? {
            ParsedHandle::Structured(handle) => Ok(handle),
            ParsedHandle::Legacy { volume_id } => {
                debug!(volume_id = %volume_id, "classifying legacy volume handle");
                Ok(self.classifier.classify(&volume_id).await?)
            }
        }
    }

    /// Encode a handle into its persisted form
    pub fn encode(&self, handle: &VolumeHandle) -> String {
        handle.encode()
    }

    /// An IP literal goes through the IP index, anything else is a GlobalID
    fn resolve(&self, array_ref: &str) -> Result<Arc<Array>> {
        if let Some(ip) = ipv4_addresses(array_ref).first() {
            return self.registry.lookup_ip(&ip.to_string()).ok_or_else(|| {
                Error::Internal(format!("no array with management IP {}", ip))
            });
        }
        self.registry.get(array_ref)
    }
}

fn malformed(raw: &str, reason: &str) -> Error {
    Error::Validation(format!("malformed volume handle {:?}: {}", raw, reason))
}
