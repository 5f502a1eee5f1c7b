//! Bounded retry with backoff for units of database work.
//!
//! # Backoff schedule
//!
//! With `exponential` set, the delay before retry `n` (1-based) is
//! `base_delay * 2^(n-1)`:
//!
//! | Retry | Delay (base 1.0s) |
//! |-------|-------------------|
//! | 1     | 1.0s              |
//! | 2     | 2.0s              |
//! | 3     | 4.0s              |
//!
//! Without it every retry waits `base_delay`.
//!
//! Only transient failures (see [`ErrorKind::is_transient`]) are retried. Anything
//! else is returned after the first attempt.

use crate::config::{DEFAULT_BASE_DELAY_SECS, DEFAULT_EXPONENTIAL_BACKOFF, DEFAULT_MAX_RETRIES};
use crate::db::ManagedConnection;
use crate::error::{Classify, DbError, ErrorKind};
use crate::resilience::recover::ensure_healthy;
use futures_util::future::BoxFuture;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

/// Retry configuration for one call site. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub exponential: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, exponential: bool) -> Self {
        Self {
            max_retries,
            base_delay,
            exponential,
        }
    }

    /// Single-row model reads and writes.
    pub fn model() -> Self {
        Self::new(3, Duration::from_secs(1), true)
    }

    /// Bulk writes: fewer, slower retries.
    pub fn bulk() -> Self {
        Self::new(2, Duration::from_secs(2), true)
    }

    /// Read-only work: more, faster retries.
    pub fn read() -> Self {
        Self::new(5, Duration::from_millis(500), true)
    }

    /// Total invocations allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.exponential {
            self.base_delay
                .saturating_mul(2u32.saturating_pow(attempt))
        } else {
            self.base_delay
        }
    }

    /// Run `op` under this policy. See [`with_retry`].
    pub async fn run<C, T, E, F>(&self, conn: &mut C, op: F) -> OperationResult<T, E>
    where
        C: ManagedConnection,
        E: Classify + fmt::Display,
        F: for<'c> FnMut(&'c mut C) -> BoxFuture<'c, Result<T, E>>,
    {
        with_retry(conn, *self, op).await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            Duration::from_secs_f64(DEFAULT_BASE_DELAY_SECS),
            DEFAULT_EXPONENTIAL_BACKOFF,
        )
    }
}

/// Outcome of a wrapped unit of work.
#[derive(Debug)]
pub enum OperationResult<T, E> {
    Success(T),
    Failure(RetryFailure<E>),
}

impl<T, E> OperationResult<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_result(self) -> Result<T, RetryFailure<E>> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }
}

/// The error that ended a wrapped call, tagged with how many attempts were made.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub kind: ErrorKind,
    pub attempts: u32,
    pub error: E,
}

impl<E: fmt::Display> fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error after {} attempt(s): {}",
            self.kind, self.attempts, self.error
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryFailure<E> {}

impl From<RetryFailure<DbError>> for DbError {
    fn from(failure: RetryFailure<DbError>) -> Self {
        failure.error
    }
}

/// Run `op` against `conn`, retrying transient failures.
///
/// `op` is invoked at most `policy.max_retries + 1` times. After each transient
/// failure except the last, the connection is recovered and the policy delay is
/// slept. Non-transient failures end the call immediately.
///
/// ```ignore
/// let result = with_retry(&mut conn, RetryPolicy::read(), |c| {
///     Box::pin(c.fetch_i64("SELECT COUNT(*) FROM orders"))
/// })
/// .await;
/// ```
pub async fn with_retry<C, T, E, F>(
    conn: &mut C,
    policy: RetryPolicy,
    mut op: F,
) -> OperationResult<T, E>
where
    C: ManagedConnection,
    E: Classify + fmt::Display,
    F: for<'c> FnMut(&'c mut C) -> BoxFuture<'c, Result<T, E>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt: u32 = 0;

    loop {
        let error = match op(&mut *conn).await {
            Ok(value) => {
                if attempt > 0 {
                    info!(attempts = attempt + 1, "Database operation succeeded after retry");
                }
                return OperationResult::Success(value);
            }
            Err(error) => error,
        };

        let kind = error.kind();
        if !kind.is_transient() {
            error!(kind = %kind, error = %error, "Non-retryable error in database operation");
            return OperationResult::Failure(RetryFailure {
                kind,
                attempts: attempt + 1,
                error,
            });
        }

        warn!(
            alias = %conn.alias(),
            attempt = attempt + 1,
            max_attempts,
            error = %error,
            "Database operation failed"
        );

        if attempt >= policy.max_retries {
            error!(
                alias = %conn.alias(),
                attempts = attempt + 1,
                "Database operation failed after all attempts"
            );
            return OperationResult::Failure(RetryFailure {
                kind,
                attempts: attempt + 1,
                error,
            });
        }
        drop(error);

        if let Err(e) = ensure_healthy(&mut *conn).await {
            warn!(alias = %conn.alias(), error = %e, "Recovery between attempts failed");
        }

        let delay = policy.delay_for(attempt);
        info!(delay_ms = delay.as_millis() as u64, "Retrying database operation");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
