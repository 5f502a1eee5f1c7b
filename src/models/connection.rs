//! Connection descriptions: backend vendor, the validated per-alias config and
//! the point-in-time [`ConnectionInfo`] reported by maintenance and `/health/connections`.

use crate::config::PoolOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Database backend behind a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Vendor for a URL scheme such as `postgres` or `mariadb`.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" => Some(Self::SQLite),
            _ => None,
        }
    }

    /// Vendor for a full connection string (`sqlite::memory:` included).
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let (scheme, _) = connection_string.split_once(':')?;
        Self::from_scheme(scheme)
    }

    /// Query returning the server version string.
    pub fn version_query(&self) -> &'static str {
        match self {
            Self::PostgreSQL | Self::MySQL => "SELECT version()",
            Self::SQLite => "SELECT sqlite_version()",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        })
    }
}

/// One pool to register: alias, vendor and connection string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub id: String,
    pub db_type: DatabaseType,
    /// Contains credentials - never log, use `masked_connection_string`
    #[serde(skip_serializing)]
    pub connection_string: String,
    #[serde(default)]
    pub pool_options: PoolOptions,
}

impl ConnectionConfig {
    pub fn new(
        id: impl Into<String>,
        connection_string: impl Into<String>,
        pool_options: PoolOptions,
    ) -> Result<Self, ConnectionConfigError> {
        let id = id.into();
        let connection_string = connection_string.into();

        if id.is_empty() {
            return Err(ConnectionConfigError::EmptyAlias);
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(ConnectionConfigError::InvalidAlias { alias: id, bad });
        }

        let Some(db_type) = DatabaseType::from_connection_string(&connection_string) else {
            // Scheme only; the rest may hold credentials
            let scheme = connection_string
                .split_once(':')
                .map_or("", |(scheme, _)| scheme)
                .to_string();
            return Err(ConnectionConfigError::UnsupportedScheme(scheme));
        };

        Ok(Self {
            id,
            db_type,
            connection_string,
            pool_options,
        })
    }

    /// The connection string with any password replaced by `****`.
    ///
    /// Only the userinfo part of the authority (between `://` and the last `@`
    /// before the path) is touched. A user without a password is left as is.
    pub fn masked_connection_string(&self) -> String {
        let url = &self.connection_string;
        let Some(scheme_end) = url.find("://") else {
            return url.clone();
        };
        let authority_start = scheme_end + 3;
        let rest = &url[authority_start..];
        let authority = rest.find(['/', '?', '#']).map_or(rest, |end| &rest[..end]);

        let Some(at) = authority.rfind('@') else {
            return url.clone();
        };
        let Some(colon) = authority[..at].find(':') else {
            return url.clone();
        };

        format!(
            "{}{}:****{}",
            &url[..authority_start],
            &authority[..colon],
            &rest[at..]
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionConfigError {
    #[error("Connection alias cannot be empty")]
    EmptyAlias,

    #[error("Connection alias '{alias}' contains '{bad}'; use letters, digits, '-' or '_'")]
    InvalidAlias { alias: String, bad: char },

    #[error("Unsupported database scheme '{0}' (expected postgres, mysql, mariadb or sqlite)")]
    UnsupportedScheme(String),
}

/// Point-in-time description of one registered connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub alias: String,
    pub vendor: DatabaseType,
    /// Whether a connection could be checked out and answered a probe.
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    pub checked_at: DateTime<Utc>,
}
