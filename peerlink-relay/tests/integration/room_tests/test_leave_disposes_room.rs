use peerlink_core::{PeerId, RoomId, SignalMessage};

use crate::integration::{init_tracing, start_relay};
use crate::utils::{SIGNAL_TIMEOUT_MS, TestClient, wait_until};

#[tokio::test]
async fn test_leave_disposes_room() {
    init_tracing();

    let (addr, state) = start_relay().await;
    let mut alice = TestClient::connect_ready(addr, "alice").await.unwrap();
    let mut bob = TestClient::connect_ready(addr, "bob").await.unwrap();

    alice.join("R1").await.unwrap();
    bob.join("R1").await.unwrap();
    alice.recv().await.unwrap();

    bob.send(SignalMessage::LeaveRoom).await.unwrap();
    let left = alice.recv().await.unwrap();
    assert_eq!(
        left.message,
        SignalMessage::PeerLeft {
            peer_id: PeerId::from("bob")
        }
    );
    assert_eq!(state.rooms.room_count(), 1);

    alice.send(SignalMessage::LeaveRoom).await.unwrap();
    let disposed = wait_until(SIGNAL_TIMEOUT_MS, || state.rooms.room_count() == 0).await;
    assert!(disposed, "empty room should be disposed");
    assert!(state.rooms.members(&RoomId::from("R1")).is_empty());

    // A second leave is a no-op
    alice.send(SignalMessage::LeaveRoom).await.unwrap();
    assert!(bob.is_silent().await.unwrap());
}
