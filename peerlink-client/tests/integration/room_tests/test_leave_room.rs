use peerlink_client::{ClientConfig, SessionEvent};
use peerlink_core::RoomId;

use crate::integration::init_tracing;
use crate::utils::{LoopbackNetwork, connected_pair, spawn_relay};

#[tokio::test]
async fn test_leave_room() {
    init_tracing();

    let relay = spawn_relay().await.expect("Failed to start relay");
    let network = LoopbackNetwork::new();
    let (mut alice, mut bob) = connected_pair(&network, &relay, ClientConfig::default())
        .await
        .unwrap();

    assert_eq!(
        bob.handle.leave_room().await.unwrap(),
        Some(RoomId::from("R1"))
    );
    assert_eq!(bob.handle.leave_room().await.unwrap(), None);
    assert_eq!(bob.sink.names_among(&["room-left"]), vec!["room-left"]);
    assert!(bob.handle.peers().await.unwrap().is_empty());
    assert!(bob.handle.connection(alice.id()).await.unwrap().is_none());

    let bob_id = bob.id();
    alice
        .wait_for("peer-left", |e| {
            matches!(e, SessionEvent::PeerLeft { peer_id } if *peer_id == bob_id)
        })
        .await
        .unwrap();
    assert!(alice.handle.connection(bob.id()).await.unwrap().is_none());

    // Coming back renegotiates from scratch
    let members = bob.handle.join_room("R1").await.unwrap();
    assert_eq!(members, vec![alice.id()]);
    alice.wait_for_channel(&bob.id()).await.unwrap();
    bob.wait_for_channel(&alice.id()).await.unwrap();
}
