//! Data models for db-guard.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod health;

pub use connection::{ConnectionConfig, ConnectionConfigError, ConnectionInfo, DatabaseType};
pub use health::{ConnectionStatus, ErrorBody, HealthReport};
