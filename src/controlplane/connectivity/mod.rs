//! Connectivity Module
//!
//! Node-to-array reachability and volume IO activity checks used by node
//! health monitors before they fence a workload.

pub mod probe;
pub mod status;

pub use probe::*;
pub use status::*;
