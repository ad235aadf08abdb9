//! Array Backends
//!
//! Clients for the array management API.

pub mod rest;

pub use rest::*;
