//! Periodic connection maintenance.
//!
//! Checks one connection per registered alias and repairs the ones that fail a
//! probe. Runs once, or as a daemon until SIGINT/SIGTERM.

use crate::db::{ConnectionManager, ManagedConnection};
use crate::error::{Classify, DbError};
use crate::resilience::ensure_healthy;
use crate::server::wait_for_signal;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Result of maintaining one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum MaintenanceOutcome {
    Healthy,
    Reconnected,
    Failed(String),
    /// No connection could be checked out for the alias.
    NoConnection,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    pub alias: String,
    #[serde(flatten)]
    pub outcome: MaintenanceOutcome,
}

/// Probe `conn` and reconnect it if the probe fails with a transient error.
pub async fn maintain_connection<C: ManagedConnection>(conn: &mut C) -> MaintenanceOutcome {
    if !conn.is_connected() {
        return MaintenanceOutcome::NoConnection;
    }

    let error = match conn.probe().await {
        Ok(()) => return MaintenanceOutcome::Healthy,
        Err(e) => e,
    };

    if !error.is_transient() {
        return MaintenanceOutcome::Failed(format!("unexpected error: {}", error));
    }

    warn!(alias = %conn.alias(), error = %error, "Connection unhealthy, reconnecting");
    match ensure_healthy(conn).await {
        Ok(()) => MaintenanceOutcome::Reconnected,
        Err(DbError::Recovery { message }) => MaintenanceOutcome::Failed(message),
        Err(e) => MaintenanceOutcome::Failed(e.to_string()),
    }
}

pub struct MaintenanceRunner {
    manager: Arc<ConnectionManager>,
    interval: Duration,
}

impl MaintenanceRunner {
    pub fn new(manager: Arc<ConnectionManager>, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// One pass over every registered alias. A failure on one alias never stops
    /// the others.
    pub async fn run_once(&self) -> Vec<MaintenanceReport> {
        let aliases = self.manager.list_connections().await;
        let mut reports = Vec::with_capacity(aliases.len());

        for alias in aliases {
            let outcome = match self.manager.checkout(&alias).await {
                Ok(mut conn) => maintain_connection(&mut conn).await,
                Err(e) => {
                    warn!(alias = %alias, error = %e, "No connection available for maintenance");
                    MaintenanceOutcome::NoConnection
                }
            };

            match &outcome {
                MaintenanceOutcome::Healthy => info!(alias = %alias, "Connection healthy"),
                MaintenanceOutcome::Reconnected => {
                    info!(alias = %alias, "Connection reconnected successfully")
                }
                MaintenanceOutcome::Failed(reason) => {
                    error!(alias = %alias, reason = %reason, "Connection maintenance failed")
                }
                MaintenanceOutcome::NoConnection => info!(alias = %alias, "No active connection"),
            }

            if tracing::enabled!(tracing::Level::DEBUG) {
                if let Ok(info) = self.manager.connection_info(&alias).await {
                    debug!(
                        alias = %info.alias,
                        vendor = %info.vendor,
                        connected = info.connected,
                        server_version = ?info.server_version,
                        "Connection info"
                    );
                }
            }

            reports.push(MaintenanceReport { alias, outcome });
        }
        reports
    }

    /// Run passes every `interval` until SIGINT or SIGTERM.
    pub async fn run_daemon(&self) {
        self.run_until(wait_for_signal()).await;
    }

    /// Run passes every `interval` until `shutdown` completes.
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting database connection maintenance"
        );
        tokio::pin!(shutdown);

        loop {
            self.run_once().await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => break,
            }
        }
        info!("Database maintenance daemon stopped");
    }
}
