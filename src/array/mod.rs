//! Array Module
//!
//! Configuration, registry and change events for the storage arrays managed
//! by this control plane.

pub mod config;
pub mod events;
pub mod registry;

pub use config::*;
pub use events::*;
pub use registry::*;
