//! Connection health probe.

use crate::db::ManagedConnection;
use crate::error::Classify;
use tracing::{error, warn};

/// Run a trivial round trip against `conn`.
///
/// Never fails: any error, including a missing connection, reads as unhealthy.
pub async fn is_healthy<C: ManagedConnection>(conn: &mut C) -> bool {
    match conn.probe().await {
        Ok(()) => true,
        Err(e) if e.is_transient() => {
            warn!(alias = %conn.alias(), error = %e, "Database connection check failed");
            false
        }
        Err(e) => {
            error!(
                alias = %conn.alias(),
                kind = %e.kind(),
                error = %e,
                "Unexpected error during database connection check"
            );
            false
        }
    }
}
