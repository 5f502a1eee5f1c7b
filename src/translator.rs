//! Last-resort handling of transient database errors that escaped a handler.

use crate::db::ManagedConnection;
use crate::error::Classify;
use crate::models::ErrorBody;
use crate::resilience::ensure_healthy;
use axum::http::StatusCode;
use std::fmt;
use tracing::{error, info};
use uuid::Uuid;

/// Message returned when the connection could not be restored.
pub const DB_UNAVAILABLE_MESSAGE: &str = "Database connection error, please try again later";

/// Message returned when the connection was restored and the client may retry.
pub const DB_RESET_MESSAGE: &str = "Database connection was reset, please retry the request";

/// `Retry-After` seconds sent with a recovered response.
pub const RETRY_AFTER_SECS: u64 = 1;

/// Identifies the request a failure belongs to in logs.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub method: String,
    pub path: String,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method: method.into(),
            path: path.into(),
        }
    }
}

/// Response the translator decided on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// The connection was reset successfully; retrying the request is reasonable.
    Recovered(ErrorBody),
    /// The connection is still unusable.
    Unrecoverable(ErrorBody),
}

impl Translation {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Recovered(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unrecoverable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> &ErrorBody {
        match self {
            Self::Recovered(body) | Self::Unrecoverable(body) => body,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Recovered(_) => Some(RETRY_AFTER_SECS),
            Self::Unrecoverable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionTranslator;

impl ExceptionTranslator {
    pub fn new() -> Self {
        Self
    }

    /// Attempt one recovery for a transient `error` and pick the response.
    ///
    /// Returns `None` for anything that is not a transient database error, which
    /// is left to the regular error path. The request itself is never replayed.
    pub async fn translate<C, E>(
        &self,
        conn: &mut C,
        error: &E,
        ctx: &RequestContext,
    ) -> Option<Translation>
    where
        C: ManagedConnection,
        E: Classify + fmt::Display,
    {
        if !error.is_transient() {
            return None;
        }

        error!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            kind = %error.kind(),
            error = %error,
            "Database connection error while handling request"
        );

        match ensure_healthy(conn).await {
            Ok(()) => {
                info!(
                    request_id = %ctx.request_id,
                    alias = %conn.alias(),
                    "Database connection recovered after request failure"
                );
                Some(Translation::Recovered(ErrorBody::retryable(DB_RESET_MESSAGE)))
            }
            Err(e) => {
                error!(
                    request_id = %ctx.request_id,
                    alias = %conn.alias(),
                    error = %e,
                    "Failed to recover database connection after request failure"
                );
                Some(Translation::Unrecoverable(ErrorBody::error(
                    DB_UNAVAILABLE_MESSAGE,
                )))
            }
        }
    }
}
