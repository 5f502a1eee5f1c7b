//! Connection maintenance passes.

mod common;

use common::{MockConnection, sqlite_manager};
use db_guard::error::DbError;
use db_guard::maintenance::{MaintenanceOutcome, MaintenanceRunner, maintain_connection};
use std::time::Duration;

#[tokio::test]
async fn test_healthy_connection_is_reported_healthy() {
    let mut conn = MockConnection::healthy();
    assert_eq!(maintain_connection(&mut conn).await, MaintenanceOutcome::Healthy);
    assert_eq!(conn.reconnects, 0);
}

#[tokio::test]
async fn test_stale_connection_is_reconnected() {
    let mut conn = MockConnection::stale();
    assert_eq!(
        maintain_connection(&mut conn).await,
        MaintenanceOutcome::Reconnected
    );
    assert_eq!(conn.closes, 1);
    assert_eq!(conn.reconnects, 1);
}

#[tokio::test]
async fn test_unreachable_server_is_reported_failed() {
    let mut conn = MockConnection::unreachable();
    let outcome = maintain_connection(&mut conn).await;
    assert!(matches!(outcome, MaintenanceOutcome::Failed(reason) if reason.contains("reconnect failed")));
}

#[tokio::test]
async fn test_reconnect_that_stays_unhealthy_is_reported_failed() {
    let mut conn = MockConnection {
        reconnect_heals: false,
        ..MockConnection::stale()
    };
    let outcome = maintain_connection(&mut conn).await;
    assert!(matches!(outcome, MaintenanceOutcome::Failed(reason) if reason.contains("did not answer")));
    assert_eq!(conn.reconnects, 1);
}

#[tokio::test]
async fn test_disconnected_handle_has_no_connection() {
    let mut conn = MockConnection::disconnected();
    assert_eq!(
        maintain_connection(&mut conn).await,
        MaintenanceOutcome::NoConnection
    );
    assert_eq!(conn.probes, 0);
}

#[tokio::test]
async fn test_unexpected_probe_error_is_not_repaired() {
    let mut conn = MockConnection::stale()
        .with_probe_error(DbError::database("permission denied", Some("42501".into()), "grant"));
    let outcome = maintain_connection(&mut conn).await;
    assert!(matches!(outcome, MaintenanceOutcome::Failed(reason) if reason.starts_with("unexpected error")));
    assert_eq!(conn.reconnects, 0);
}

#[tokio::test]
async fn test_run_once_covers_every_alias() {
    let manager = sqlite_manager(&["billing", "market"]).await;
    manager.get_pool("billing").await.unwrap().close().await;

    let runner = MaintenanceRunner::new(manager, Duration::from_secs(300));
    let reports = runner.run_once().await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].alias, "billing");
    assert_eq!(reports[0].outcome, MaintenanceOutcome::NoConnection);
    assert_eq!(reports[1].alias, "market");
    assert_eq!(reports[1].outcome, MaintenanceOutcome::Healthy);
}

#[tokio::test]
async fn test_daemon_stops_on_shutdown() {
    let manager = sqlite_manager(&["main"]).await;
    let runner = MaintenanceRunner::new(manager, Duration::from_secs(300));

    tokio::time::timeout(Duration::from_secs(5), runner.run_until(async {}))
        .await
        .expect("daemon should stop once shutdown completes");
}
