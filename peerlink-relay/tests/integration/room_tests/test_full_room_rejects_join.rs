use peerlink_core::{PeerId, RoomId, SignalMessage};
use peerlink_relay::RelayConfig;

use crate::integration::init_tracing;
use crate::utils::{TestClient, spawn_relay};

#[tokio::test]
async fn test_full_room_rejects_join() {
    init_tracing();

    let config = RelayConfig {
        max_room_size: 1,
        ..RelayConfig::default()
    };
    let (addr, state) = spawn_relay(config).await.unwrap();
    let mut alice = TestClient::connect_ready(addr, "alice").await.unwrap();
    let mut bob = TestClient::connect_ready(addr, "bob").await.unwrap();

    alice.join("R1").await.unwrap();
    bob.send(SignalMessage::JoinRoom {
        room_id: RoomId::from("R1"),
    })
    .await
    .unwrap();

    let rejected = bob.recv().await.unwrap();
    match rejected.message {
        SignalMessage::JoinRejected { room_id, .. } => assert_eq!(room_id, RoomId::from("R1")),
        other => panic!("expected join-rejected, got {:?}", other),
    }

    assert!(alice.is_silent().await.unwrap());
    assert_eq!(state.rooms.members(&RoomId::from("R1")), vec![PeerId::from("alice")]);
}
