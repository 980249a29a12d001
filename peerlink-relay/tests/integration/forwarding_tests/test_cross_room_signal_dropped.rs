use peerlink_core::{PeerId, SignalMessage};

use crate::integration::{init_tracing, start_relay};
use crate::utils::TestClient;

#[tokio::test]
async fn test_cross_room_signal_dropped() {
    init_tracing();

    let (addr, _state) = start_relay().await;
    let mut alice = TestClient::connect_ready(addr, "alice").await.unwrap();
    let mut bob = TestClient::connect_ready(addr, "bob").await.unwrap();
    alice.join("R1").await.unwrap();
    bob.join("R2").await.unwrap();

    alice
        .send(SignalMessage::Offer {
            target: PeerId::from("bob"),
            offer: "v=0".into(),
        })
        .await
        .unwrap();
    assert!(bob.is_silent().await.unwrap(), "offer crossed rooms");

    // Unknown targets are dropped as well
    alice
        .send(SignalMessage::Offer {
            target: PeerId::from("nobody"),
            offer: "v=0".into(),
        })
        .await
        .unwrap();
    assert!(alice.is_silent().await.unwrap());
}
