//! Array Registry
//!
//! In-memory store of the arrays this control plane manages, indexed by
//! GlobalID and by management IP, with a designated default array.
//!
//! All three views live behind a single lock so readers never see a
//! half-applied reload. A reload builds its replacement state without holding
//! the lock and swaps it in at once.

use super::config::{ArrayConfig, ArrayConfigSource, TransportType};
use super::events::RegistryEvent;
use crate::domain::ports::{ArrayClientRef, ClientFactory};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

// =============================================================================
// Array Entry
// =============================================================================

/// A configured array bound to its API client
pub struct Array {
    config: ArrayConfig,
    ip: String,
    client: ArrayClientRef,
}

impl std::fmt::Debug for Array {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Array")
            .field("global_id", &self.config.global_id)
            .field("ip", &self.ip)
            .finish()
    }
}

impl Array {
    /// Create a new array entry, resolving its management IP
    pub fn new(config: ArrayConfig, client: ArrayClientRef) -> Result<Self> {
        config.validate()?;
        let ip = config.resolve_ip()?;
        Ok(Self { config, ip, client })
    }

    pub fn global_id(&self) -> &str {
        &self.config.global_id
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn block_protocol(&self) -> TransportType {
        self.config.block_protocol
    }

    pub fn is_default(&self) -> bool {
        self.config.is_default
    }

    pub fn config(&self) -> &ArrayConfig {
        &self.config
    }

    /// API client bound to this array
    pub fn client(&self) -> &ArrayClientRef {
        &self.client
    }

    /// Credential-free view for reporting
    pub fn summary(&self) -> ArraySummary {
        ArraySummary {
            global_id: self.config.global_id.clone(),
            endpoint: self.config.endpoint.clone(),
            ip: self.ip.clone(),
            block_protocol: self.config.block_protocol,
            is_default: self.config.is_default,
        }
    }
}

/// Reportable description of a registered array
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArraySummary {
    #[serde(rename = "globalID")]
    pub global_id: String,
    pub endpoint: String,
    pub ip: String,
    pub block_protocol: TransportType,
    pub is_default: bool,
}

// =============================================================================
// Registry State
// =============================================================================

#[derive(Default)]
struct RegistryState {
    /// Arrays by GlobalID, in configuration order
    arrays: IndexMap<String, Arc<Array>>,
    /// Management IP to GlobalID
    ip_index: HashMap<String, String>,
    default: Option<Arc<Array>>,
}

impl RegistryState {
    /// Build a consistent state from a list of arrays
    fn build(arrays: Vec<Arc<Array>>) -> Result<Self> {
        let mut map = IndexMap::with_capacity(arrays.len());
        let mut ip_index = HashMap::with_capacity(arrays.len());

        for array in arrays {
            let id = array.global_id().to_string();
            if map.contains_key(&id) {
                return Err(Error::Configuration(format!("duplicate globalID: {}", id)));
            }
            ip_index.insert(array.ip().to_string(), id.clone());
            map.insert(id, array);
        }

        let default = Self::pick_default(&map);
        Ok(Self {
            arrays: map,
            ip_index,
            default,
        })
    }

    /// First array flagged default, else the first configured
    fn pick_default(arrays: &IndexMap<String, Arc<Array>>) -> Option<Arc<Array>> {
        arrays
            .values()
            .find(|a| a.is_default())
            .or_else(|| arrays.values().next())
            .cloned()
    }
}

// =============================================================================
// Array Registry
// =============================================================================

/// Registry of managed arrays
pub struct ArrayRegistry {
    state: Mutex<RegistryState>,
    /// Event broadcaster
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl std::fmt::Debug for ArrayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayRegistry")
            .field("array_count", &self.len())
            .finish()
    }
}

impl ArrayRegistry {
    /// Create a new, empty registry
    pub fn new() -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(64);
        Arc::new(Self {
            state: Mutex::new(RegistryState::default()),
            event_sender,
        })
    }

    /// Create a registry holding the given arrays
    pub fn from_arrays(arrays: Vec<Arc<Array>>) -> Result<Arc<Self>> {
        let registry = Self::new();
        registry.set_all(arrays)?;
        Ok(registry)
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Get an array by GlobalID
    pub fn get(&self, global_id: &str) -> Result<Arc<Array>> {
        self.state
            .lock()
            .arrays
            .get(global_id)
            .cloned()
            .ok_or_else(|| Error::ArrayNotFound {
                global_id: global_id.to_string(),
            })
    }

    /// Snapshot of all arrays in configuration order
    pub fn all(&self) -> Vec<Arc<Array>> {
        self.state.lock().arrays.values().cloned().collect()
    }

    /// Replace every array at once, rebuilding the IP index and default
    pub fn set_all(&self, arrays: Vec<Arc<Array>>) -> Result<()> {
        let next = RegistryState::build(arrays)?;
        let array_count = next.arrays.len();
        let default_array = next.default.as_ref().map(|a| a.global_id().to_string());

        *self.state.lock() = next;

        let _ = self.event_sender.send(RegistryEvent::Reloaded {
            array_count,
            default_array,
        });
        Ok(())
    }

    /// The default array, present whenever any array is registered
    pub fn default_array(&self) -> Option<Arc<Array>> {
        self.state.lock().default.clone()
    }

    /// Make a registered array the default
    pub fn set_default(&self, array: Arc<Array>) -> Result<()> {
        let global_id = array.global_id().to_string();
        {
            let mut state = self.state.lock();
            if !state.arrays.contains_key(&global_id) {
                return Err(Error::ArrayNotFound { global_id });
            }
            state.default = Some(array);
        }

        info!("Default array set to {}", global_id);
        let _ = self.event_sender.send(RegistryEvent::DefaultChanged { global_id });
        Ok(())
    }

    /// Find the array with the given management IP
    pub fn lookup_ip(&self, ip: &str) -> Option<Arc<Array>> {
        let state = self.state.lock();
        state
            .ip_index
            .get(ip)
            .and_then(|id| state.arrays.get(id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reload the array set from its source.
    ///
    /// On any failure the current arrays stay in place.
    pub fn reload(&self, source: &ArrayConfigSource, factory: &dyn ClientFactory) -> Result<usize> {
        match Self::build_arrays(source, factory) {
            Ok(arrays) => {
                let count = arrays.len();
                self.set_all(arrays).map_err(|e| self.reload_failed(e))?;
                info!("Array registry reloaded with {} arrays", count);
                Ok(count)
            }
            Err(e) => Err(self.reload_failed(e)),
        }
    }

    fn build_arrays(source: &ArrayConfigSource, factory: &dyn ClientFactory) -> Result<Vec<Arc<Array>>> {
        let configs = source.load()?;
        if configs.is_empty() {
            return Err(Error::Configuration("no arrays found in configuration".into()));
        }

        configs
            .into_iter()
            .map(|config| {
                let client = factory.build(&config)?;
                Ok(Arc::new(Array::new(config, client)?))
            })
            .collect()
    }

    fn reload_failed(&self, error: Error) -> Error {
        warn!(error = %error, "array registry reload rejected, keeping previous arrays");
        let _ = self.event_sender.send(RegistryEvent::ReloadFailed {
            reason: error.to_string(),
        });
        error
    }
}
