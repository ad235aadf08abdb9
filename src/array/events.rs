//! Registry Events
//!
//! Events emitted by the array registry so that long-lived consumers can
//! react to configuration changes.

use serde::{Deserialize, Serialize};

/// Events emitted by the array registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// A new array set was swapped in
    Reloaded {
        array_count: usize,
        default_array: Option<String>,
    },

    /// The default array was replaced explicitly
    DefaultChanged { global_id: String },

    /// A reload was rejected; the previous array set is still active
    ReloadFailed { reason: String },
}

impl RegistryEvent {
    /// Get the array ID this event is about, if any
    pub fn global_id(&self) -> Option<&str> {
        match self {
            RegistryEvent::Reloaded { default_array, .. } => default_array.as_deref(),
            RegistryEvent::DefaultChanged { global_id } => Some(global_id),
            RegistryEvent::ReloadFailed { .. } => None,
        }
    }

    /// Check if this event changed the active array set
    pub fn is_state_change(&self) -> bool {
        !matches!(self, RegistryEvent::ReloadFailed { .. })
    }
}
