//! Array Volume Control Plane
//!
//! Bridges orchestrator volume requests to the management API of one or
//! more block/file storage arrays.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        Operational REST API                          │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌────────────────────┐  │
//! │  │  Volume Handle   │  │   Connectivity   │  │    Replication     │  │
//! │  │      Codec       │  │      Probe       │  │    Orchestrator    │  │
//! │  └────────┬─────────┘  └────────┬─────────┘  └─────────┬──────────┘  │
//! │           └─────────────────────┼──────────────────────┘             │
//! │                     ┌───────────┴───────────┐                        │
//! │                     │    Array Registry     │                        │
//! │                     │ (GlobalID / IP index) │                        │
//! │                     └───────────┬───────────┘                        │
//! ├─────────────────────────────────┼────────────────────────────────────┤
//! │                      Array management REST clients                   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`array`]: Array configuration and the shared registry
//! - [`controlplane`]: Handle codec, connectivity probe, replication and APIs
//! - [`domain`]: Array API types and client traits
//! - [`error`]: Error types and handling
//! - [`metrics`]: Prometheus counters

pub mod array;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod metrics;

#[cfg(test)]
pub mod testing;

// Re-export commonly used types
pub use array::{Array, ArrayConfig, ArrayConfigSource, ArrayRegistry, ArraySummary, RegistryEvent};

pub use controlplane::{
    ApiServer, ApiServerConfig, AppState, RestRouter,
    ConnectivityProbe, ConnectivityRequest, ConnectivityResult, HttpNodeStatusClient, ProbeConfig,
    Protocol, VolumeHandle, VolumeHandleCodec,
    ActionType, ReplicationConfig, ReplicationOrchestrator,
    RestArrayClient, RestClientConfig, RestClientFactory,
};

pub use domain::ports::{ArrayClient, ArrayClientRef, ClientFactory, NodeStatusClient};

pub use error::{ApiError, Code, Error, ErrorAction, Result};

pub use metrics::ControllerMetrics;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
