//! Health and error payload models.

use serde::{Deserialize, Serialize};

/// Connection status of a single request as it moves through the guard.
///
/// `Unknown -> {Healthy, Recovered, RecoveryFailed} -> Cleaned`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Unknown,
    Healthy,
    Recovered,
    /// Recovery was attempted and failed; the handler still runs.
    RecoveryFailed,
    Cleaned,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Recovered => "recovered",
            Self::RecoveryFailed => "recovery_failed",
            Self::Cleaned => "cleaned",
        }
    }

    /// True when the connection answered a probe during `pre`.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Healthy | Self::Recovered)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error body returned to HTTP clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
    /// Only serialized when set, so the unrecoverable body stays `{status, message}`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl ErrorBody {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            ..Self::error(message)
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub database: String,
    pub connection: ConnectionStatus,
    /// Queries issued by this request so far.
    pub query_count: usize,
}
