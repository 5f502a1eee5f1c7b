//! Checked-out connection handles.
//!
//! [`ManagedConnection`] is the capability set the resilience layer works against:
//! a round-trip probe, close, reconnect, and optionally a lightweight liveness
//! check. [`PooledConnection`] implements it on top of a sqlx pool checkout.
//!
//! A handle belongs to the execution context that checked it out. It is `Send` so
//! it can follow its task across worker threads, but it is never shared: callers
//! hold it by `&mut`, and recovery on one handle never touches another.

use crate::db::pool::DbPool;
use crate::db::macros::dispatch_checkout;
use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use sqlx::pool::PoolConnection;
use sqlx::{MySql, Postgres, Sqlite};
use std::future::Future;
use tracing::debug;

/// Optional operations a connection type may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// A cheap liveness check that never reconnects on its own.
    pub ping: bool,
}

/// Connection operations used by probes, recovery, retries and request guards.
pub trait ManagedConnection: Send {
    /// Alias of the pool this handle came from, for log fields.
    fn alias(&self) -> &str;

    /// Whether a live connection object is currently held.
    fn is_connected(&self) -> bool;

    fn capabilities(&self) -> Capabilities;

    /// Queries issued through this handle since it was checked out.
    fn query_count(&self) -> usize;

    /// Trivial round trip (`SELECT 1`). Not counted as a query.
    fn probe(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    /// Lightweight liveness check. Only meaningful when `capabilities().ping` is set.
    fn ping(&mut self) -> impl Future<Output = DbResult<()>> + Send {
        async { Err(DbError::unsupported("ping")) }
    }

    /// Close the held connection. The handle is disconnected afterwards even on error.
    fn close(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    /// Obtain a fresh connection from the pool.
    fn reconnect(&mut self) -> impl Future<Output = DbResult<()>> + Send;
}

/// A single connection checked out of one of the backend pools.
pub enum Checkout {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

impl Checkout {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            Checkout::MySql(_) => DatabaseType::MySQL,
            Checkout::Postgres(_) => DatabaseType::PostgreSQL,
            Checkout::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

impl std::fmt::Debug for Checkout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Checkout").field(&self.db_type()).finish()
    }
}

/// Pool-backed implementation of [`ManagedConnection`].
pub struct PooledConnection {
    alias: String,
    pool: DbPool,
    checkout: Option<Checkout>,
    queries: usize,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("alias", &self.alias)
            .field("db_type", &self.pool.db_type())
            .field("connected", &self.checkout.is_some())
            .field("queries", &self.queries)
            .finish()
    }
}

impl PooledConnection {
    /// Check a connection out of `pool`.
    pub async fn acquire(alias: impl Into<String>, pool: DbPool) -> DbResult<Self> {
        let checkout = pool.acquire().await?;
        Ok(Self {
            alias: alias.into(),
            pool,
            checkout: Some(checkout),
            queries: 0,
        })
    }

    /// A handle that holds no connection yet. The first probe fails and
    /// recovery performs the checkout.
    pub fn detached(alias: impl Into<String>, pool: DbPool) -> Self {
        Self {
            alias: alias.into(),
            pool,
            checkout: None,
            queries: 0,
        }
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    fn checkout_mut(&mut self) -> DbResult<&mut Checkout> {
        let alias = &self.alias;
        self.checkout.as_mut().ok_or_else(|| {
            DbError::interface(format!("No active connection for '{}'", alias))
        })
    }

    /// The underlying sqlx connection, for queries that bind parameters or
    /// decode rows. Each call counts as one query.
    ///
    /// ```ignore
    /// if let Checkout::Postgres(pg) = conn.connection_mut()? {
    ///     sqlx::query("DELETE FROM sessions WHERE user_id = $1")
    ///         .bind(user_id)
    ///         .execute(&mut **pg)
    ///         .await?;
    /// }
    /// ```
    pub fn connection_mut(&mut self) -> DbResult<&mut Checkout> {
        self.queries += 1;
        self.checkout_mut()
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let checkout = self.connection_mut()?;
        let result = dispatch_checkout!(checkout, conn => {
            sqlx::query(sql)
                .execute(&mut **conn)
                .await
                .map(|r| r.rows_affected())
        });
        result.map_err(DbError::from)
    }

    /// Fetch a single integer, e.g. `SELECT COUNT(*) FROM ...`.
    pub async fn fetch_i64(&mut self, sql: &str) -> DbResult<i64> {
        let checkout = self.connection_mut()?;
        let result = dispatch_checkout!(checkout, conn => {
            sqlx::query_scalar::<_, i64>(sql).fetch_one(&mut **conn).await
        });
        result.map_err(DbError::from)
    }

    /// Server version string; not counted as a request query.
    pub async fn server_version(&mut self) -> DbResult<String> {
        let query = self.db_type().version_query();
        let checkout = self.checkout_mut()?;
        let result = dispatch_checkout!(checkout, conn => {
            sqlx::query_scalar::<_, String>(query).fetch_one(&mut **conn).await
        });
        result.map_err(DbError::from)
    }
}

impl ManagedConnection for PooledConnection {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn is_connected(&self) -> bool {
        self.checkout.is_some()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { ping: true }
    }

    fn query_count(&self) -> usize {
        self.queries
    }

    async fn probe(&mut self) -> DbResult<()> {
        let checkout = self.checkout_mut()?;
        let result = dispatch_checkout!(checkout, conn => {
            sqlx::query("SELECT 1").execute(&mut **conn).await.map(|_| ())
        });
        result.map_err(DbError::from)
    }

    async fn ping(&mut self) -> DbResult<()> {
        let checkout = self.checkout_mut()?;
        let result = dispatch_checkout!(checkout, conn => {
            sqlx::Connection::ping(&mut **conn).await
        });
        result.map_err(DbError::from)
    }

    async fn close(&mut self) -> DbResult<()> {
        let Some(checkout) = self.checkout.take() else {
            return Ok(());
        };
        debug!(alias = %self.alias, "Closing connection");
        let result = dispatch_checkout!(checkout, conn => {
            sqlx::Connection::close(conn.detach()).await
        });
        result.map_err(DbError::from)
    }

    async fn reconnect(&mut self) -> DbResult<()> {
        // Return whatever we still hold before taking a new one.
        self.checkout = None;
        let checkout = self.pool.acquire().await?;
        debug!(alias = %self.alias, "Checked out fresh connection");
        self.checkout = Some(checkout);
        Ok(())
    }
}
