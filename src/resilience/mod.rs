//! Connection resilience primitives.
//!
//! - [`is_healthy`]: round-trip probe that never fails
//! - [`ensure_healthy`]: close-and-reconnect recovery
//! - [`with_retry`]: bounded retry with backoff around a unit of work

pub mod probe;
pub mod recover;
pub mod retry;

pub use probe::is_healthy;
pub use recover::ensure_healthy;
pub use retry::{OperationResult, RetryFailure, RetryPolicy, with_retry};
