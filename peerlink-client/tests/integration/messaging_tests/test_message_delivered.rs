use peerlink_client::{ClientConfig, SessionEvent};
use peerlink_core::MessageStatus;

use crate::integration::init_tracing;
use crate::utils::{LoopbackNetwork, connected_pair, spawn_relay};

#[tokio::test]
async fn test_message_delivered() {
    init_tracing();

    let relay = spawn_relay().await.expect("Failed to start relay");
    let network = LoopbackNetwork::new();
    let (mut alice, mut bob) = connected_pair(&network, &relay, ClientConfig::default())
        .await
        .unwrap();

    let sent = alice
        .handle
        .send_message(bob.id(), "hello bob", None)
        .await
        .unwrap();
    assert_eq!(sent.status, MessageStatus::Sent);

    let received = bob
        .wait_for("message-received", |e| matches!(e, SessionEvent::MessageReceived(_)))
        .await
        .unwrap();
    let SessionEvent::MessageReceived(received) = received else {
        unreachable!()
    };
    assert_eq!(received.id, sent.id);
    assert_eq!(received.content, "hello bob");
    assert_eq!(received.sender_id, alice.id());

    let delivered = alice
        .wait_for("message-delivered", |e| matches!(e, SessionEvent::MessageDelivered(_)))
        .await
        .unwrap();
    let SessionEvent::MessageDelivered(delivered) = delivered else {
        unreachable!()
    };
    assert_eq!(delivered.id, sent.id);
    assert_eq!(delivered.status, MessageStatus::Delivered);

    let history = alice.handle.messages().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, MessageStatus::Delivered);

    // A reply threads onto the original
    let reply = bob
        .handle
        .send_message(alice.id(), "hi alice", Some(sent.id.clone()))
        .await
        .unwrap();
    let threaded = alice
        .wait_for("reply", |e| matches!(e, SessionEvent::MessageReceived(_)))
        .await
        .unwrap();
    let SessionEvent::MessageReceived(threaded) = threaded else {
        unreachable!()
    };
    assert_eq!(threaded.id, reply.id);
    assert_eq!(threaded.reply_to, Some(sent.id));

    assert_eq!(
        alice.sink.names_among(&["message-sent", "message-delivered", "message-received"]),
        vec!["message-sent", "message-delivered", "message-received"]
    );

    alice.handle.clear_history().await.unwrap();
    assert!(alice.handle.messages().await.unwrap().is_empty());
}
