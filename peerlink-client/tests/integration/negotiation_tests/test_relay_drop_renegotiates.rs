use peerlink_client::{ClientConfig, ConnectionStatus, SessionEvent};
use std::time::Duration;

use crate::integration::init_tracing;
use crate::utils::{LoopbackNetwork, SeverableLink, TestPeer, spawn_relay};

#[tokio::test]
async fn test_relay_drop_renegotiates() {
    init_tracing();

    let relay = spawn_relay().await.expect("Failed to start relay");
    let network = LoopbackNetwork::new();
    let mut config = ClientConfig::default();
    config.signaling.reconnect_base_delay = Duration::from_millis(200);

    // alice has the smaller id, so she is the one who must offer again
    let (link, cutter) = SeverableLink::new();
    let mut alice = TestPeer::spawn_with_link(&network, "alice", config.clone(), Box::new(link));
    alice.handle.initialize(relay.as_str()).await.unwrap();
    alice.handle.join_room("R1").await.unwrap();
    let mut bob = TestPeer::join(&network, &relay, "bob", "R1", config)
        .await
        .unwrap();
    alice.wait_for_channel(&bob.id()).await.unwrap();
    bob.wait_for_channel(&alice.id()).await.unwrap();

    cutter.cut().await;

    let alice_id = alice.id();
    bob.wait_for("peer-left", |e| {
        matches!(e, SessionEvent::PeerLeft { peer_id } if *peer_id == alice_id)
    })
    .await
    .unwrap();
    alice
        .wait_for("reconnecting", |e| matches!(e, SessionEvent::Reconnecting { .. }))
        .await
        .unwrap();
    alice
        .wait_for("room-joined", |e| matches!(e, SessionEvent::RoomJoined { .. }))
        .await
        .unwrap();

    alice.wait_for_channel(&bob.id()).await.unwrap();
    bob.wait_for_channel(&alice.id()).await.unwrap();

    let info = alice.handle.connection(bob.id()).await.unwrap().unwrap();
    assert_eq!(info.status, ConnectionStatus::Connected);
    assert!(info.channel_open);

    alice
        .handle
        .send_message(bob.id(), "still there?", None)
        .await
        .unwrap();
    bob.wait_for("message-received", |e| matches!(e, SessionEvent::MessageReceived(_)))
        .await
        .unwrap();
    alice
        .wait_for("message-delivered", |e| matches!(e, SessionEvent::MessageDelivered(_)))
        .await
        .unwrap();
}
