use peerlink_core::{PeerId, SignalEnvelope, SignalMessage};

use crate::integration::{init_tracing, start_relay};
use crate::utils::TestClient;

#[tokio::test]
async fn test_offer_is_stamped_with_sender() {
    init_tracing();

    let (addr, _state) = start_relay().await;
    let mut alice = TestClient::connect_ready(addr, "alice").await.unwrap();
    let mut bob = TestClient::connect_ready(addr, "bob").await.unwrap();
    alice.join("R1").await.unwrap();
    bob.join("R1").await.unwrap();
    alice.recv().await.unwrap();

    alice
        .send(SignalMessage::Offer {
            target: PeerId::from("bob"),
            offer: "v=0 alice".into(),
        })
        .await
        .unwrap();

    let offer = bob.recv().await.unwrap();
    assert_eq!(offer.sender, Some(PeerId::from("alice")));
    assert_eq!(
        offer.message,
        SignalMessage::Offer {
            target: PeerId::from("bob"),
            offer: "v=0 alice".into(),
        }
    );

    bob.send(SignalMessage::Answer {
        target: PeerId::from("alice"),
        answer: "v=0 bob".into(),
    })
    .await
    .unwrap();
    let answer = alice.recv().await.unwrap();
    assert_eq!(answer.sender, Some(PeerId::from("bob")));
}

#[tokio::test]
async fn test_spoofed_sender_is_overwritten() {
    init_tracing();

    let (addr, _state) = start_relay().await;
    let mut alice = TestClient::connect_ready(addr, "alice").await.unwrap();
    let mut bob = TestClient::connect_ready(addr, "bob").await.unwrap();
    alice.join("R1").await.unwrap();
    bob.join("R1").await.unwrap();
    alice.recv().await.unwrap();

    let spoofed = SignalEnvelope::from_sender(
        SignalMessage::IceCandidate {
            target: PeerId::from("bob"),
            candidate: "candidate:1".into(),
        },
        PeerId::from("mallory"),
        5,
    );
    alice.send_envelope(&spoofed).await.unwrap();

    let candidate = bob.recv().await.unwrap();
    assert_eq!(candidate.sender, Some(PeerId::from("alice")));
    assert_eq!(candidate.timestamp, 5);
}
