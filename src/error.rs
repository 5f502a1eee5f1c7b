//! Error types for db-guard.
//!
//! All failures are expressed through [`DbError`]. Each variant belongs to exactly
//! one [`ErrorKind`], and the kind alone decides whether a failure is transient
//! (worth a reconnect and retry) or must be surfaced to the caller untouched.

use thiserror::Error;

/// Closed set of failure classes used for retry and translation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport-level failure: dropped connection, I/O, TLS, pool timeout.
    Operational,
    /// The connection handle itself is unusable: closed, detached, protocol desync.
    Interface,
    /// Query-logic failure reported by the server (constraint, syntax, missing row).
    Query,
    /// A close-and-reconnect attempt did not yield a healthy connection.
    Recovery,
    /// Best-effort post-request hygiene failed.
    Cleanup,
    /// Anything that is not a database failure.
    Other,
}

impl ErrorKind {
    /// Transient failures are recoverable by closing and re-establishing the connection.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Operational | Self::Interface)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Operational => "operational",
            Self::Interface => "interface",
            Self::Query => "query",
            Self::Recovery => "recovery",
            Self::Cleanup => "cleanup",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that can be sorted into an [`ErrorKind`].
pub trait Classify {
    fn kind(&self) -> ErrorKind;

    fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}

#[derive(Error, Debug, Clone)]
pub enum DbError {
    #[error("Operational error: {message}")]
    Operational { message: String, suggestion: String },

    #[error("Interface error: {message}")]
    Interface { message: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "23505" for unique violation
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} did not complete in time")]
    Timeout { operation: String },

    #[error("Connection recovery failed: {message}")]
    Recovery { message: String },

    #[error("Connection cleanup failed: {message}")]
    Cleanup { message: String },

    #[error("Connection does not support {capability}")]
    Unsupported { capability: &'static str },

    #[error("Connection not found: {connection_id}")]
    ConnectionNotFound { connection_id: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("{message}")]
    Application { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create an operational error with a helpful suggestion.
    pub fn operational(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Operational {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an interface error.
    pub fn interface(message: impl Into<String>) -> Self {
        Self::Interface {
            message: message.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn recovery(message: impl Into<String>) -> Self {
        Self::Recovery {
            message: message.into(),
        }
    }

    pub fn cleanup(message: impl Into<String>) -> Self {
        Self::Cleanup {
            message: message.into(),
        }
    }

    pub fn unsupported(capability: &'static str) -> Self {
        Self::Unsupported { capability }
    }

    pub fn connection_not_found(connection_id: impl Into<String>) -> Self {
        Self::ConnectionNotFound {
            connection_id: connection_id.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Wrap a failure that did not come from the database.
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Operational { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}

impl Classify for DbError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Operational { .. } | Self::Timeout { .. } => ErrorKind::Operational,
            Self::Interface { .. } => ErrorKind::Interface,
            Self::Database { .. } => ErrorKind::Query,
            Self::Recovery { .. } => ErrorKind::Recovery,
            Self::Cleanup { .. } => ErrorKind::Cleanup,
            Self::Unsupported { .. }
            | Self::ConnectionNotFound { .. }
            | Self::InvalidInput { .. }
            | Self::Application { .. }
            | Self::Internal { .. } => ErrorKind::Other,
        }
    }
}

impl Classify for sqlx::Error {
    fn kind(&self) -> ErrorKind {
        match self {
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
                ErrorKind::Operational
            }
            sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed | sqlx::Error::Protocol(_) => {
                ErrorKind::Interface
            }
            sqlx::Error::Database(db_err) => {
                if is_connection_state(db_err.code().as_deref(), db_err.message()) {
                    ErrorKind::Operational
                } else {
                    ErrorKind::Query
                }
            }
            sqlx::Error::RowNotFound
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_) => ErrorKind::Query,
            _ => ErrorKind::Other,
        }
    }
}

/// Server-reported errors that describe the connection rather than the query.
///
/// SQLSTATE class 08 is "connection exception" for both PostgreSQL and MySQL,
/// 57P01..57P03 are PostgreSQL shutdown notices, and SQLite reports busy/locked
/// databases as primary result codes 5 and 6.
fn is_connection_state(code: Option<&str>, message: &str) -> bool {
    match code {
        Some(code) if code.starts_with("08") => true,
        Some("57P01" | "57P02" | "57P03") => true,
        Some("5" | "6") => true,
        _ => message.to_ascii_lowercase().contains("database is locked"),
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        let kind = err.kind();
        match err {
            sqlx::Error::Configuration(msg) => DbError::invalid_input(format!(
                "Invalid connection configuration: {}",
                msg
            )),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                if kind == ErrorKind::Operational {
                    DbError::operational(
                        db_err.message(),
                        "The server dropped or refused the session; reconnect and retry",
                    )
                } else {
                    DbError::database(
                        db_err.message(),
                        code,
                        "Check the SQL syntax and referenced objects",
                    )
                }
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire"),
            sqlx::Error::PoolClosed => DbError::interface("Connection pool is closed"),
            sqlx::Error::WorkerCrashed => DbError::interface("Database worker crashed"),
            sqlx::Error::Io(io_err) => DbError::operational(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::operational(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::interface(format!("Protocol error: {}", msg)),
            sqlx::Error::ColumnNotFound(col) => DbError::database(
                format!("Column not found: {}", col),
                None,
                "Check the selected columns",
            ),
            sqlx::Error::ColumnDecode { index, source } => DbError::database(
                format!("Failed to decode column {}: {}", index, source),
                None,
                "Check the column types",
            ),
            other => DbError::internal(format!("Unknown database error: {}", other)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
