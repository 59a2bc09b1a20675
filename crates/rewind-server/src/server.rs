//! HTTP server lifecycle.
//!
//! Binding and serving are split so the engine can fail fast on a bad
//! listen address before it starts the tick loop, then serve on a
//! background task until its shutdown signal fires.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use rewind_core::config::ServerSettings;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Bind the listener described by `settings`.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address does not parse or the
/// port cannot be bound.
pub async fn bind(settings: &ServerSettings) -> Result<TcpListener, ServerError> {
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .map_err(|e| ServerError::Bind(format!("invalid address: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    info!(%addr, "Server listening");
    Ok(listener)
}

/// Serve the router on `listener` until `shutdown` completes.
///
/// # Errors
///
/// Returns [`ServerError::Serve`] if the server hits a fatal I/O error.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))?;

    info!("Server stopped");
    Ok(())
}

/// Errors that can occur when starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}
