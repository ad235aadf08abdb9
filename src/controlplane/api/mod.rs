//! API Module
//!
//! REST API for array management, connectivity probing and replication.

pub mod server;
pub mod rest;

pub use server::*;
pub use rest::*;
