//! Integration tests for peerlink-relay.
//!
//! Tests are organized by functionality:
//! - `connection_tests` - socket greeting and disconnection
//! - `room_tests` - join and leave fan-out
//! - `forwarding_tests` - offer/answer/candidate routing

pub mod forwarding_tests;
pub mod room_tests;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::Level;

use peerlink_relay::{AppState, RelayConfig};

use crate::utils::spawn_relay;

/// Initialize tracing for tests (call once per test).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Relay with default settings.
pub async fn start_relay() -> (SocketAddr, Arc<AppState>) {
    spawn_relay(RelayConfig::default())
        .await
        .expect("Failed to start relay")
}
