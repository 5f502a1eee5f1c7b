//! Per-request connection hooks.
//!
//! [`RequestLifecycleGuard::pre`] runs before the handler and repairs a dead
//! connection; [`RequestLifecycleGuard::post`] runs after it, reports the query
//! count and does best-effort connection hygiene. Neither hook ever fails the
//! request.

use crate::config::ResilienceConfig;
use crate::db::ManagedConnection;
use crate::error::{DbError, DbResult};
use crate::models::ConnectionStatus;
use crate::resilience::{ensure_healthy, is_healthy};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct RequestLifecycleGuard {
    high_query_count_threshold: usize,
}

impl RequestLifecycleGuard {
    pub fn new(high_query_count_threshold: usize) -> Self {
        Self {
            high_query_count_threshold,
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(config.high_query_count_threshold)
    }

    pub fn high_query_count_threshold(&self) -> usize {
        self.high_query_count_threshold
    }

    /// Pre-request health check.
    ///
    /// Returns [`ConnectionStatus::RecoveryFailed`] rather than an error when the
    /// connection cannot be repaired; the request proceeds either way.
    pub async fn pre<C: ManagedConnection>(&self, conn: &mut C) -> ConnectionStatus {
        if is_healthy(conn).await {
            return ConnectionStatus::Healthy;
        }

        warn!(alias = %conn.alias(), "Unhealthy database connection before request, recovering");
        match ensure_healthy(conn).await {
            Ok(()) => ConnectionStatus::Recovered,
            Err(e) => {
                error!(
                    alias = %conn.alias(),
                    error = %e,
                    "Could not recover database connection, continuing with request"
                );
                ConnectionStatus::RecoveryFailed
            }
        }
    }

    /// Post-request telemetry and connection hygiene. Always ends in `Cleaned`.
    pub async fn post<C: ManagedConnection>(&self, conn: &mut C) -> ConnectionStatus {
        let query_count = conn.query_count();
        if query_count > self.high_query_count_threshold {
            warn!(
                alias = %conn.alias(),
                query_count,
                threshold = self.high_query_count_threshold,
                "High query count for request"
            );
        } else {
            debug!(alias = %conn.alias(), query_count, "Request query count");
        }

        if let Err(e) = cleanup(conn).await {
            warn!(alias = %conn.alias(), error = %e, "Connection cleanup failed");
        }
        ConnectionStatus::Cleaned
    }

    /// Run `handler` between `pre` and `post`.
    ///
    /// `post` runs on every exit path of the handler, including a panic, which is
    /// resumed once cleanup has finished.
    pub async fn scope<C, T, F>(&self, conn: &mut C, handler: F) -> T
    where
        C: ManagedConnection,
        F: for<'c> FnOnce(&'c mut C) -> BoxFuture<'c, T>,
    {
        let status = self.pre(conn).await;
        debug!(alias = %conn.alias(), status = %status, "Connection checked before handler");

        let outcome = AssertUnwindSafe(handler(&mut *conn)).catch_unwind().await;
        self.post(conn).await;

        match outcome {
            Ok(value) => value,
            Err(panic) => {
                info!(alias = %conn.alias(), "Handler panicked; cleanup completed");
                std::panic::resume_unwind(panic)
            }
        }
    }
}

impl Default for RequestLifecycleGuard {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}

/// Ping when the connection supports it, close otherwise or when the ping fails.
async fn cleanup<C: ManagedConnection>(conn: &mut C) -> DbResult<()> {
    if !conn.is_connected() {
        return Ok(());
    }

    if conn.capabilities().ping {
        match conn.ping().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                debug!(alias = %conn.alias(), error = %e, "Ping failed, closing connection");
            }
        }
    }

    conn.close()
        .await
        .map_err(|e| DbError::cleanup(e.to_string()))
}
