use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use peerlink_relay::{AppState, RelayConfig};

/// Timeout for a single expected signal (ms).
pub const SIGNAL_TIMEOUT_MS: u64 = 2000;

/// How long a client must stay quiet to count as "received nothing" (ms).
pub const SILENCE_MS: u64 = 300;

/// Runs a relay on an ephemeral local port.
///
/// Returns the bound address and the shared state so tests can inspect
/// rooms directly.
pub async fn spawn_relay(config: RelayConfig) -> Result<(SocketAddr, Arc<AppState>)> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind relay listener")?;
    let addr = listener.local_addr()?;
    let state = Arc::new(AppState::new(&config));

    let server_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = peerlink_relay::serve(listener, server_state).await {
            tracing::error!("[RelayHelper] relay stopped: {:?}", e);
        }
    });

    Ok((addr, state))
}

/// Polls `condition` until it holds or `timeout_ms` elapses.
pub async fn wait_until(timeout_ms: u64, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
