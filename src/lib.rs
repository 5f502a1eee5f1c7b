//! db-guard library
//!
//! A database connection resilience layer for sqlx pools (SQLite, PostgreSQL,
//! MySQL): health probes, close-and-reconnect recovery, bounded retry with
//! backoff, per-request lifecycle hooks for axum, and translation of transient
//! database errors into structured responses.

pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod maintenance;
pub mod middleware;
pub mod models;
pub mod resilience;
pub mod server;
pub mod translator;

pub use config::Config;
pub use error::{Classify, DbError, DbResult, ErrorKind};
pub use guard::RequestLifecycleGuard;
pub use resilience::{OperationResult, RetryPolicy, with_retry};
pub use translator::ExceptionTranslator;
