//! Backend dispatch macros.
//!
//! A checked-out connection is one of three concrete sqlx connection types. These
//! macros expand one arm per backend so call sites stay linear while each arm is
//! compiled against its own connection type.

/// Run the same expression against whichever backend a `Checkout` holds.
///
/// # Example
///
/// ```ignore
/// let rows = dispatch_checkout!(checkout, conn => {
///     sqlx::query("SELECT 1").execute(&mut **conn).await
/// });
/// ```
macro_rules! dispatch_checkout {
    ($checkout:expr, $conn:ident => $body:expr) => {
        match $checkout {
            $crate::db::connection::Checkout::MySql($conn) => $body,
            $crate::db::connection::Checkout::Postgres($conn) => $body,
            $crate::db::connection::Checkout::SQLite($conn) => $body,
        }
    };
}

/// Same as [`dispatch_checkout!`] but over the pools themselves.
macro_rules! dispatch_pool {
    ($pool:expr, $p:ident => $body:expr) => {
        match $pool {
            $crate::db::pool::DbPool::MySql($p) => $body,
            $crate::db::pool::DbPool::Postgres($p) => $body,
            $crate::db::pool::DbPool::SQLite($p) => $body,
        }
    };
}

pub(crate) use dispatch_checkout;
pub(crate) use dispatch_pool;
