//! HTTP host for the connection guard.
//!
//! Endpoints:
//! - `GET /health`: `SELECT 1` on the request's own connection, with retry,
//!   behind [`connection_guard`]
//! - `GET /health/connections`: a fresh [`ConnectionInfo`] per registered alias.
//!   Not guarded, since it checks out its own connection from every pool.

use crate::db::{ConnectionManager, ManagedConnection};
use crate::error::{DbError, DbResult};
use crate::middleware::{GuardState, RequestConnection, connection_guard};
use crate::models::{ConnectionInfo, HealthReport};
use crate::resilience::with_retry;
use axum::{Extension, Json, Router, extract::State, routing::get};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Build the router. Only routes added before `layer` are guarded.
pub fn router(state: Arc<GuardState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            connection_guard,
        ))
        .route("/health/connections", get(connections))
        .with_state(state)
}

async fn health(
    State(state): State<Arc<GuardState>>,
    Extension(request_conn): Extension<RequestConnection>,
) -> Result<Json<HealthReport>, DbError> {
    let mut conn = request_conn.lock().await;
    with_retry(&mut *conn, state.retry(), |c| Box::pin(c.execute("SELECT 1")))
        .await
        .into_result()?;

    Ok(Json(HealthReport {
        status: "ok".to_string(),
        database: state.alias().to_string(),
        connection: request_conn.status(),
        query_count: conn.query_count(),
    }))
}

async fn connections(State(state): State<Arc<GuardState>>) -> Json<Vec<ConnectionInfo>> {
    Json(state.manager().connection_info_all().await)
}

/// HTTP server with graceful shutdown.
pub struct HttpServer {
    state: Arc<GuardState>,
    host: String,
    port: u16,
}

impl HttpServer {
    pub fn new(state: Arc<GuardState>, host: impl Into<String>, port: u16) -> Self {
        Self {
            state,
            host: host.into(),
            port,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn manager(&self) -> &Arc<ConnectionManager> {
        self.state.manager()
    }

    /// Serve until SIGINT or SIGTERM, then close every pool.
    pub async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting db-guard HTTP server on {}", bind_addr);

        let app = router(self.state.clone());

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::operational(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        info!(alias = %self.state.alias(), "Connection guard ready");

        // In-flight requests get this long to finish once a signal arrives
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(DbError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for requests to finish (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        info!("Closing database connections");
        self.manager().close_all().await;

        Ok(())
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub(crate) async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
