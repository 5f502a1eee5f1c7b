//! Database access layer.
//!
//! This module provides:
//! - Pool registration by alias
//! - Per-context connection checkout
//! - The connection capability trait used by the resilience layer
//! - Backend dispatch macros

pub mod connection;
mod macros;
pub mod pool;

pub use connection::{Capabilities, Checkout, ManagedConnection, PooledConnection};
pub use pool::{ConnectionManager, DbPool};
