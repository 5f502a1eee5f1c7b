//! Shared test helpers.

#![allow(dead_code)]

use db_guard::config::{PoolOptions, ResilienceConfig};
use db_guard::db::{Capabilities, ConnectionManager, ManagedConnection};
use db_guard::error::{DbError, DbResult};
use db_guard::models::ConnectionConfig;
use db_guard::resilience::RetryPolicy;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted connection that records every call made on it.
#[derive(Debug)]
pub struct MockConnection {
    pub connected: bool,
    pub healthy: bool,
    /// Error returned by `probe` while unhealthy.
    pub probe_error: DbError,
    pub reconnect_ok: bool,
    /// Whether a successful reconnect also makes the connection healthy.
    pub reconnect_heals: bool,
    pub ping_supported: bool,
    pub ping_ok: bool,
    pub close_ok: bool,
    pub queries: usize,

    pub probes: usize,
    pub pings: usize,
    pub closes: usize,
    pub reconnects: usize,
}

impl MockConnection {
    pub fn healthy() -> Self {
        Self {
            connected: true,
            healthy: true,
            probe_error: DbError::operational("server has gone away", "reconnect"),
            reconnect_ok: true,
            reconnect_heals: true,
            ping_supported: true,
            ping_ok: true,
            close_ok: true,
            queries: 0,
            probes: 0,
            pings: 0,
            closes: 0,
            reconnects: 0,
        }
    }

    /// Connected but stale; a reconnect fixes it.
    pub fn stale() -> Self {
        Self {
            healthy: false,
            ..Self::healthy()
        }
    }

    /// Stale and the server refuses new connections.
    pub fn unreachable() -> Self {
        Self {
            reconnect_ok: false,
            ..Self::stale()
        }
    }

    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::stale()
        }
    }

    pub fn without_ping(mut self) -> Self {
        self.ping_supported = false;
        self
    }

    pub fn with_failing_ping(mut self) -> Self {
        self.ping_ok = false;
        self
    }

    pub fn with_failing_close(mut self) -> Self {
        self.close_ok = false;
        self
    }

    pub fn with_probe_error(mut self, error: DbError) -> Self {
        self.probe_error = error;
        self
    }

    pub fn with_queries(mut self, queries: usize) -> Self {
        self.queries = queries;
        self
    }
}

impl ManagedConnection for MockConnection {
    fn alias(&self) -> &str {
        "mock"
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            ping: self.ping_supported,
        }
    }

    fn query_count(&self) -> usize {
        self.queries
    }

    async fn probe(&mut self) -> DbResult<()> {
        self.probes += 1;
        if !self.connected {
            return Err(DbError::interface("connection already closed"));
        }
        if self.healthy {
            Ok(())
        } else {
            Err(self.probe_error.clone())
        }
    }

    async fn ping(&mut self) -> DbResult<()> {
        self.pings += 1;
        if self.ping_ok {
            Ok(())
        } else {
            Err(DbError::operational("ping timed out", "reconnect"))
        }
    }

    async fn close(&mut self) -> DbResult<()> {
        self.closes += 1;
        self.connected = false;
        if self.close_ok {
            Ok(())
        } else {
            Err(DbError::interface("close on broken socket"))
        }
    }

    async fn reconnect(&mut self) -> DbResult<()> {
        self.reconnects += 1;
        if !self.reconnect_ok {
            return Err(DbError::operational("connection refused", "start the server"));
        }
        self.connected = true;
        self.healthy = self.reconnect_heals;
        Ok(())
    }
}

/// A manager with one in-memory SQLite pool per alias.
pub async fn sqlite_manager(aliases: &[&str]) -> Arc<ConnectionManager> {
    let manager = Arc::new(ConnectionManager::new());
    for alias in aliases {
        let config = ConnectionConfig::new(*alias, "sqlite::memory:", PoolOptions::default())
            .expect("valid config");
        manager.connect(config).await.expect("sqlite connects");
    }
    manager
}

/// Short delays so failure paths finish quickly.
pub fn fast_resilience(max_retries: u32) -> ResilienceConfig {
    ResilienceConfig {
        retry: RetryPolicy::new(max_retries, Duration::from_millis(10), true),
        ..ResilienceConfig::default()
    }
}

/// Collects formatted log lines for the current thread's subscriber.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    lines: Arc<Mutex<Vec<u8>>>,
}

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    /// Route DEBUG and above into this capture until the guard is dropped.
    /// Requires a current-thread runtime, which `#[tokio::test]` provides.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let lines = self.lines.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || CaptureWriter(lines.clone()))
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contains(&self, needle: &str) -> bool {
        String::from_utf8_lossy(&self.lines.lock().unwrap()).contains(needle)
    }
}
