//! iobus client entry point.
//!
//! Loads the TOML config, connects a session to the configured host, and
//! runs until Ctrl-C. State transitions and host errors are logged as they
//! arrive on the session manager's watch channels; a UI front-end would
//! subscribe to the same channels instead.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use iobus_client::application::SessionManager;
use iobus_client::infrastructure::storage::load_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    // RUST_LOG wins; the config file's level is the fallback.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.client.log_level.clone())),
        )
        .init();

    info!("iobus client starting as '{}'", config.client.name);

    let manager = Arc::new(SessionManager::new(config.client.name.clone()));

    // Log lifecycle and error transitions in the background.
    let mut state_rx = manager.subscribe_state();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            info!("connection state: {:?}", *state_rx.borrow());
        }
    });
    let mut error_rx = manager.subscribe_errors();
    tokio::spawn(async move {
        while error_rx.changed().await.is_ok() {
            if let Some(msg) = error_rx.borrow().clone() {
                warn!("connection error: {msg}");
            }
        }
    });

    manager
        .connect(&config.network.host, config.network.tcp_port)
        .await?;

    // Prime the UI with an initial host snapshot.
    manager.request_system_state().await;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    manager.disconnect().await;

    info!("iobus client stopped");
    Ok(())
}
