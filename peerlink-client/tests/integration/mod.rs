//! Integration tests for peerlink-client.
//!
//! Sessions talk through a real relay on a local port and a loopback
//! transport in place of WebRTC:
//! - `negotiation_tests` - relay connect and peer negotiation
//! - `messaging_tests` - text messages and delivery receipts
//! - `transfer_tests` - chunked file transfer
//! - `room_tests` - leaving and rejoining rooms

pub mod messaging_tests;
pub mod negotiation_tests;
pub mod room_tests;
pub mod transfer_tests;

use tracing::Level;

/// Initialize tracing for tests (call once per test).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}
