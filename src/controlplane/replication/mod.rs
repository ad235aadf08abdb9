//! Replication Module
//!
//! Protection groups, replication session actions and volume group
//! snapshots on the registered arrays.

pub mod orchestrator;
pub mod snapshot;
pub mod state;

pub use orchestrator::*;
pub use snapshot::*;
pub use state::*;
