//! Legacy Classification
//!
//! Volumes created by the oldest releases are identified by a bare array
//! volume ID. They live on the default array and their protocol is found by
//! asking the array which kind of object owns the ID.

use super::handle::{Protocol, VolumeHandle};
use crate::array::ArrayRegistry;
use crate::error::{ApiError, Error};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Failure to classify a bare volume ID
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LegacyClassifyError {
    #[error("no default array configured for legacy volume {volume_id}")]
    NoDefaultArray { volume_id: String },

    #[error("legacy volume {volume_id} not found on array {array}: {source}")]
    NotFound {
        volume_id: String,
        array: String,
        #[source]
        source: ApiError,
    },

    #[error("failure checking volume status of {volume_id}: {source}")]
    Unknown {
        volume_id: String,
        array: String,
        #[source]
        source: ApiError,
    },
}

impl From<LegacyClassifyError> for Error {
    fn from(e: LegacyClassifyError) -> Self {
        match e {
            LegacyClassifyError::NoDefaultArray { .. } => Error::Configuration(e.to_string()),
            LegacyClassifyError::NotFound { array, source, .. } => {
                Error::array_api(array, "classify legacy volume", source)
            }
            LegacyClassifyError::Unknown { .. } => Error::Unknown(e.to_string()),
        }
    }
}

/// Resolves the array and protocol of bare legacy volume IDs
#[derive(Debug, Clone)]
pub struct LegacyClassifier {
    registry: Arc<ArrayRegistry>,
}

impl LegacyClassifier {
    pub fn new(registry: Arc<ArrayRegistry>) -> Self {
        Self { registry }
    }

    /// Classify a bare volume ID against the default array.
    ///
    /// A block volume wins over a file system with the same ID.
    pub async fn classify(&self, volume_id: &str) -> Result<VolumeHandle, LegacyClassifyError> {
        let array = self
            .registry
            .default_array()
            .ok_or_else(|| LegacyClassifyError::NoDefaultArray {
                volume_id: volume_id.to_string(),
            })?;
        let client = array.client();

        if client.get_volume(volume_id).await.is_ok() {
            debug!(volume_id, array = array.global_id(), "legacy volume is a block volume");
            return Ok(VolumeHandle::new(volume_id, array.global_id(), Protocol::Scsi));
        }

        match client.get_filesystem(volume_id).await {
            Ok(_) => {
                debug!(volume_id, array = array.global_id(), "legacy volume is a file system");
                Ok(VolumeHandle::new(volume_id, array.global_id(), Protocol::Nfs))
            }
            Err(source) if source.is_not_found() => Err(LegacyClassifyError::NotFound {
                volume_id: volume_id.to_string(),
                array: array.global_id().to_string(),
                source,
            }),
            Err(source) => Err(LegacyClassifyError::Unknown {
                volume_id: volume_id.to_string(),
                array: array.global_id().to_string(),
                source,
            }),
        }
    }
}
