use peerlink_client::{ClientConfig, ConnectionStatus, PeerStatus, Role, SessionEvent};

use crate::integration::init_tracing;
use crate::utils::{LoopbackNetwork, TestPeer, spawn_relay};

#[tokio::test]
async fn test_peers_connect_through_relay() {
    init_tracing();

    let relay = spawn_relay().await.expect("Failed to start relay");
    let network = LoopbackNetwork::new();

    let mut alice = TestPeer::join(&network, &relay, "alice", "R1", ClientConfig::default())
        .await
        .unwrap();
    let members = {
        let bob = TestPeer::spawn(&network, "bob", ClientConfig::default());
        bob.handle.initialize(relay.as_str()).await.unwrap();
        let members = bob.handle.join_room("R1").await.unwrap();
        (bob, members)
    };
    let (mut bob, existing) = members;
    assert_eq!(existing, vec![alice.id()]);

    alice
        .wait_for("peer-joined", |e| matches!(e, SessionEvent::PeerJoined { .. }))
        .await
        .unwrap();
    alice.wait_for_channel(&bob.id()).await.unwrap();
    bob.wait_for_channel(&alice.id()).await.unwrap();

    // The smaller id offers
    let info = alice.handle.connection(bob.id()).await.unwrap().unwrap();
    assert_eq!(info.role, Role::Initiator);
    assert_eq!(info.status, ConnectionStatus::Connected);
    assert!(info.channel_open);

    let info = bob.handle.connection(alice.id()).await.unwrap().unwrap();
    assert_eq!(info.role, Role::Responder);
    assert_eq!(info.status, ConnectionStatus::Connected);

    let peers = bob.handle.peers().await.unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].peer_id, alice.id());
    assert_eq!(peers[0].status, PeerStatus::Connected);

    assert_eq!(
        alice.sink.names_among(&["room-joined", "peer-joined", "peer-connected", "channel-open"]),
        vec!["room-joined", "peer-joined", "peer-connected", "channel-open"]
    );
}
