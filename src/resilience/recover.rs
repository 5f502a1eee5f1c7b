//! Close-and-reconnect recovery.

use crate::db::ManagedConnection;
use crate::error::{DbError, DbResult};
use crate::resilience::probe::is_healthy;
use tracing::{debug, error, info};

/// Make sure `conn` holds a connection that answers a probe.
///
/// A connection that already answers is left alone, so calling this on a healthy
/// handle costs one round trip. Otherwise the current connection is closed (close
/// errors are ignored), a fresh one is checked out and probed again.
///
/// Returns [`DbError::Recovery`] when no healthy connection could be obtained.
pub async fn ensure_healthy<C: ManagedConnection>(conn: &mut C) -> DbResult<()> {
    if conn.is_connected() && is_healthy(conn).await {
        return Ok(());
    }

    if conn.is_connected() {
        if let Err(e) = conn.close().await {
            debug!(alias = %conn.alias(), error = %e, "Ignoring error while closing stale connection");
        }
    }

    if let Err(e) = conn.reconnect().await {
        error!(alias = %conn.alias(), error = %e, "Failed to restore database connection");
        return Err(DbError::recovery(format!("reconnect failed: {}", e)));
    }

    if !is_healthy(conn).await {
        error!(alias = %conn.alias(), "Reconnected but the new connection is still unhealthy");
        return Err(DbError::recovery(
            "fresh connection did not answer the health probe",
        ));
    }

    info!(alias = %conn.alias(), "Database connection restored successfully");
    Ok(())
}
