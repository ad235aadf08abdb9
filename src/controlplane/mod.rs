//! Control Plane Module
//!
//! Volume lifecycle operations against the registered storage arrays:
//! handle decoding, host connectivity checks and replication.

pub mod api;
pub mod backends;
pub mod codec;
pub mod connectivity;
pub mod replication;

pub use api::*;
pub use backends::{RestArrayClient, RestClientConfig, RestClientFactory, APPLICATION_TYPE_HEADER};
pub use codec::*;
pub use connectivity::*;
pub use replication::*;
