//! Request lifecycle hooks: pre-request repair, post-request hygiene and scoping.

mod common;

use common::MockConnection;
use db_guard::error::{DbError, DbResult};
use db_guard::guard::RequestLifecycleGuard;
use db_guard::models::ConnectionStatus;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;

#[tokio::test]
async fn test_pre_healthy_connection_is_left_alone() {
    let guard = RequestLifecycleGuard::default();
    let mut conn = MockConnection::healthy();

    assert_eq!(guard.pre(&mut conn).await, ConnectionStatus::Healthy);
    assert_eq!(conn.reconnects, 0);
    assert_eq!(conn.closes, 0);
}

#[tokio::test]
async fn test_pre_recovers_stale_connection() {
    let guard = RequestLifecycleGuard::default();
    let mut conn = MockConnection::stale();

    assert_eq!(guard.pre(&mut conn).await, ConnectionStatus::Recovered);
    assert_eq!(conn.reconnects, 1);
}

#[tokio::test]
async fn test_pre_recovery_failure_is_not_fatal() {
    let guard = RequestLifecycleGuard::default();
    let mut conn = MockConnection::unreachable();

    let status = guard.pre(&mut conn).await;
    assert_eq!(status, ConnectionStatus::RecoveryFailed);
    assert!(!status.is_usable());
}

#[tokio::test]
async fn test_post_pings_when_supported() {
    let guard = RequestLifecycleGuard::default();
    let mut conn = MockConnection::healthy();

    assert_eq!(guard.post(&mut conn).await, ConnectionStatus::Cleaned);
    assert_eq!(conn.pings, 1);
    assert_eq!(conn.closes, 0);
    assert!(conn.connected);
}

#[tokio::test]
async fn test_post_closes_when_ping_fails() {
    let guard = RequestLifecycleGuard::default();
    let mut conn = MockConnection::healthy().with_failing_ping();

    assert_eq!(guard.post(&mut conn).await, ConnectionStatus::Cleaned);
    assert_eq!(conn.pings, 1);
    assert_eq!(conn.closes, 1);
    assert!(!conn.connected);
}

#[tokio::test]
async fn test_post_closes_without_ping_capability() {
    let guard = RequestLifecycleGuard::default();
    let mut conn = MockConnection::healthy().without_ping();

    assert_eq!(guard.post(&mut conn).await, ConnectionStatus::Cleaned);
    assert_eq!(conn.pings, 0);
    assert_eq!(conn.closes, 1);
}

#[tokio::test]
async fn test_post_swallows_cleanup_errors() {
    let guard = RequestLifecycleGuard::default();
    let mut conn = MockConnection::healthy()
        .with_failing_ping()
        .with_failing_close();

    assert_eq!(guard.post(&mut conn).await, ConnectionStatus::Cleaned);
    assert_eq!(conn.closes, 1);
}

#[tokio::test]
async fn test_post_skips_hygiene_when_disconnected() {
    let guard = RequestLifecycleGuard::default();
    let mut conn = MockConnection::disconnected();

    assert_eq!(guard.post(&mut conn).await, ConnectionStatus::Cleaned);
    assert_eq!(conn.pings, 0);
    assert_eq!(conn.closes, 0);
}

#[tokio::test]
async fn test_high_query_count_has_no_behavioral_effect() {
    let guard = RequestLifecycleGuard::new(50);
    assert_eq!(guard.high_query_count_threshold(), 50);

    let mut conn = MockConnection::healthy().with_queries(51);
    assert_eq!(guard.post(&mut conn).await, ConnectionStatus::Cleaned);
    assert_eq!(conn.pings, 1);
    assert!(conn.connected);
}

#[tokio::test]
async fn test_scope_runs_post_when_handler_errors() {
    let guard = RequestLifecycleGuard::default();
    let mut conn = MockConnection::healthy().without_ping();

    let result: DbResult<()> = guard
        .scope(&mut conn, |_c| {
            Box::pin(async { Err(DbError::application("invalid coupon")) })
        })
        .await;

    assert!(matches!(result, Err(DbError::Application { .. })));
    assert_eq!(conn.probes, 1);
    assert_eq!(conn.closes, 1);
}

async fn exploding_handler(_conn: &mut MockConnection) -> DbResult<()> {
    panic!("handler exploded")
}

#[tokio::test]
async fn test_scope_runs_post_when_handler_panics() {
    let guard = RequestLifecycleGuard::default();
    let mut conn = MockConnection::healthy().without_ping();

    let outcome = AssertUnwindSafe(guard.scope(&mut conn, |c| Box::pin(exploding_handler(c))))
        .catch_unwind()
        .await;

    assert!(outcome.is_err());
    assert_eq!(conn.closes, 1);
}

#[tokio::test]
async fn test_scope_handler_sees_recovered_connection() {
    let guard = RequestLifecycleGuard::default();
    let mut conn = MockConnection::stale();

    let connected = guard
        .scope(&mut conn, |c| Box::pin(async move { c.connected && c.healthy }))
        .await;

    assert!(connected);
    assert_eq!(conn.reconnects, 1);
    assert_eq!(conn.pings, 1);
}
