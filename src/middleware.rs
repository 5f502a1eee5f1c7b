//! Axum middleware that wraps every request in the connection lifecycle.
//!
//! For each request the middleware checks a connection out of the primary pool,
//! runs the guard's `pre` hook, hands the connection to the handler through a
//! [`RequestConnection`] extension, translates transient database errors the
//! handler returned, and finally runs `post`. If the request future is dropped
//! or the handler panics, `post` is spawned from a drop guard instead.

use crate::db::{ConnectionManager, PooledConnection};
use crate::error::{Classify, DbError, ErrorKind};
use crate::guard::RequestLifecycleGuard;
use crate::models::ConnectionStatus;
use crate::resilience::RetryPolicy;
use crate::translator::{ExceptionTranslator, RequestContext, Translation};
use crate::config::ResilienceConfig;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Shared state for [`connection_guard`].
#[derive(Debug, Clone)]
pub struct GuardState {
    manager: Arc<ConnectionManager>,
    alias: String,
    guard: RequestLifecycleGuard,
    translator: ExceptionTranslator,
    retry: RetryPolicy,
}

impl GuardState {
    pub fn new(
        manager: Arc<ConnectionManager>,
        alias: impl Into<String>,
        resilience: &ResilienceConfig,
    ) -> Self {
        Self {
            manager,
            alias: alias.into(),
            guard: RequestLifecycleGuard::from_config(resilience),
            translator: ExceptionTranslator::new(),
            retry: resilience.retry,
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Alias of the pool guarded requests check out from.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Retry policy for handlers that wrap their own database work.
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Check out a connection for one request.
    ///
    /// A failed checkout is not an error here: the handle starts out detached and
    /// the `pre` hook gets a chance to recover it.
    async fn checkout(&self) -> Result<PooledConnection, DbError> {
        match self.manager.checkout(&self.alias).await {
            Ok(conn) => Ok(conn),
            Err(e @ DbError::ConnectionNotFound { .. }) => Err(e),
            Err(e) => {
                warn!(alias = %self.alias, error = %e, "Connection checkout failed");
                let pool = self.manager.get_pool(&self.alias).await?;
                Ok(PooledConnection::detached(self.alias.clone(), pool))
            }
        }
    }
}

/// The request's own connection, available to handlers as an extension.
#[derive(Debug, Clone)]
pub struct RequestConnection {
    conn: Arc<Mutex<PooledConnection>>,
    status: ConnectionStatus,
    context: Arc<RequestContext>,
}

impl RequestConnection {
    /// Exclusive access to the connection for the duration of the guard.
    pub async fn lock(&self) -> MutexGuard<'_, PooledConnection> {
        self.conn.lock().await
    }

    /// Outcome of the pre-request check.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }
}

/// Runs `post` on a spawned task if the request future is cancelled before the
/// middleware finishes.
struct CleanupOnDrop {
    conn: Option<Arc<Mutex<PooledConnection>>>,
    guard: RequestLifecycleGuard,
}

impl CleanupOnDrop {
    fn disarm(&mut self) {
        self.conn = None;
    }
}

impl Drop for CleanupOnDrop {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let guard = self.guard;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let mut conn = conn.lock().await;
                    guard.post(&mut *conn).await;
                });
            }
            Err(_) => warn!("No runtime available for post-request cleanup"),
        }
    }
}

/// Connection lifecycle middleware. Install with
/// `axum::middleware::from_fn_with_state(state, connection_guard)`.
pub async fn connection_guard(
    State(state): State<Arc<GuardState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let ctx = Arc::new(RequestContext::new(
        request.method().as_str(),
        request.uri().path(),
    ));

    let mut conn = match state.checkout().await {
        Ok(conn) => conn,
        Err(e) => return e.into_response(),
    };

    let status = state.guard.pre(&mut conn).await;
    debug!(
        request_id = %ctx.request_id,
        alias = %state.alias,
        status = %status,
        "Pre-request connection check"
    );

    let shared = Arc::new(Mutex::new(conn));
    let mut cleanup = CleanupOnDrop {
        conn: Some(shared.clone()),
        guard: state.guard,
    };

    request.extensions_mut().insert(RequestConnection {
        conn: shared.clone(),
        status,
        context: ctx.clone(),
    });

    let outcome = AssertUnwindSafe(next.run(request)).catch_unwind().await;

    let mut conn = shared.lock().await;
    let outcome = match outcome {
        Ok(mut response) => {
            if let Some(error) = response.extensions_mut().remove::<DbError>() {
                if let Some(translation) =
                    state.translator.translate(&mut *conn, &error, &ctx).await
                {
                    response = translation.into_response();
                }
            }
            Ok(response)
        }
        Err(panic) => Err(panic),
    };

    cleanup.disarm();
    state.guard.post(&mut *conn).await;
    drop(conn);

    match outcome {
        Ok(response) => response,
        Err(panic) => {
            warn!(request_id = %ctx.request_id, "Handler panicked, connection cleaned up");
            std::panic::resume_unwind(panic)
        }
    }
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorDetail<'a>,
}

impl DbError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Self::ConnectionNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Application { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ if self.kind() == ErrorKind::Operational || self.kind() == ErrorKind::Interface => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors returned by handlers carry themselves in the response extensions so
/// [`connection_guard`] can translate transient ones.
impl IntoResponse for DbError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            error: ErrorDetail {
                code: self.kind().as_str(),
                message: self.to_string(),
                suggestion: self.suggestion(),
            },
        };
        let mut response = (self.status_code(), Json(body)).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl IntoResponse for Translation {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self.retry_after();
        let body = match self {
            Translation::Recovered(body) | Translation::Unrecoverable(body) => body,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
