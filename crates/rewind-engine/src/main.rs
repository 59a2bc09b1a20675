//! Engine binary for the Rewind server.
//!
//! Wires the motion simulator, the shared history, the session server,
//! and the optional durable mirror together, then drives the tick loop
//! until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `rewind-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Start the server clock and create the position history
//! 4. Connect the durable mirror, if configured, and reset its stream
//! 5. Bind the listener and start serving sessions
//! 6. Run the tick loop until `Ctrl-C`
//! 7. Close open sessions, stop the server, and log the result

mod error;
mod publish_callback;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rewind_core::clock::ServerClock;
use rewind_core::config::{RewindConfig, StoreConfig};
use rewind_core::history::PositionHistory;
use rewind_core::runner;
use rewind_core::simulator::MotionSimulator;
use rewind_db::HistoryStream;
use rewind_server::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::publish_callback::PublishCallback;

/// Configuration file, relative to the working directory.
const CONFIG_PATH: &str = "rewind-config.yaml";

/// Upper bound on the initial store connection.
const STORE_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// How long the server gets to drain after the tick loop stops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, logging cannot be
/// initialized, or the listener cannot be bound.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .try_init()
        .map_err(|e| EngineError::Logging {
            message: format!("{e}"),
        })?;

    info!("rewind-engine starting");
    if !from_file {
        info!(path = CONFIG_PATH, "Config file not found, using defaults");
    }
    info!(
        tick_interval_ms = config.simulation.tick_interval_ms,
        speed = config.simulation.speed,
        retention = config.history.retention,
        hit_radius = config.resolver.hit_radius,
        enforce_window = config.resolver.enforce_window,
        sync_mode = ?config.sync.mode,
        "Configuration loaded"
    );

    // 3. Clock and history.
    let clock = ServerClock::start();
    let history = PositionHistory::shared(config.history.retention)?;

    // 4. Durable mirror (optional).
    let mut app_state = AppState::new(&config, clock, Arc::clone(&history));
    if let Some(store) = connect_store(&config.store, config.history.retention).await {
        app_state = app_state.with_store(store);
    }
    let app_state = Arc::new(app_state);

    // 5. Session server.
    let listener = rewind_server::bind(&config.server).await?;
    let (stop_server, server_stopped) = tokio::sync::oneshot::channel::<()>();
    let mut server_handle = tokio::spawn(rewind_server::serve(
        listener,
        Arc::clone(&app_state),
        async move {
            let _ = server_stopped.await;
        },
    ));

    // 6. Tick loop.
    let mut simulator = MotionSimulator::new(&config.simulation, clock);
    let mut callback = PublishCallback::new(Arc::clone(&app_state));

    let result = runner::run_motion_loop(
        &mut simulator,
        &history,
        config.simulation.tick_interval(),
        None,
        shutdown_signal(),
        &mut callback,
    )
    .await;

    // 7. End open sessions, then stop the server.
    app_state.close_sessions();
    let _ = stop_server.send(());
    match tokio::time::timeout(SHUTDOWN_GRACE, &mut server_handle).await {
        Ok(Ok(served)) => served?,
        Ok(Err(e)) => warn!(error = %e, "Server task failed"),
        Err(_) => {
            warn!("Server did not stop in time, aborting");
            server_handle.abort();
        }
    }

    info!(
        end_reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        reversals = simulator.reversals(),
        "rewind-engine shutdown complete"
    );

    Ok(())
}

/// Load configuration from [`CONFIG_PATH`], falling back to defaults
/// (with environment overrides) when the file does not exist.
///
/// Returns the config and whether it came from the file.
fn load_config() -> Result<(RewindConfig, bool), EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok((RewindConfig::from_file(config_path)?, true))
    } else {
        let mut config = RewindConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok((config, false))
    }
}

/// Connect and reset the mirror. Any failure leaves the server running
/// on the in-memory history alone.
async fn connect_store(config: &StoreConfig, retention: usize) -> Option<HistoryStream> {
    let Some(url) = config.url.as_deref() else {
        info!("No store URL configured, history is in-memory only");
        return None;
    };

    info!(key = %config.key, "Connecting to durable mirror");
    let connected = tokio::time::timeout(
        STORE_CONNECT_TIMEOUT,
        HistoryStream::connect(url, &config.key, retention),
    )
    .await;

    let store = match connected {
        Ok(Ok(store)) => store,
        Ok(Err(e)) => {
            warn!(error = %e, "Durable mirror unavailable, continuing in-memory only");
            return None;
        }
        Err(_) => {
            warn!(
                timeout = ?STORE_CONNECT_TIMEOUT,
                "Durable mirror connection timed out, continuing in-memory only"
            );
            return None;
        }
    };

    // Server time restarts with the process, so entries from a previous
    // run would interleave with this one.
    if let Err(e) = store.reset().await {
        warn!(error = %e, "Failed to reset durable mirror, continuing in-memory only");
        return None;
    }

    info!(key = store.key(), "Durable mirror attached");
    Some(store)
}

/// Resolve on `Ctrl-C`.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received, shutting down");
}
