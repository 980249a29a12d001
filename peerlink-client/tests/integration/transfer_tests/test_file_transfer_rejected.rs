use peerlink_client::{ClientConfig, FileSource, SessionEvent};
use peerlink_core::TransferStatus;

use crate::integration::init_tracing;
use crate::utils::{LoopbackNetwork, connected_pair, spawn_relay};

#[tokio::test]
async fn test_file_transfer_rejected() {
    init_tracing();

    let relay = spawn_relay().await.expect("Failed to start relay");
    let network = LoopbackNetwork::new();
    let (mut alice, mut bob) = connected_pair(&network, &relay, ClientConfig::default())
        .await
        .unwrap();

    let file = FileSource::new("notes.txt", "text/plain", b"not for you".to_vec());
    let record = alice
        .handle
        .initiate_file_transfer(bob.id(), file)
        .await
        .unwrap();

    bob.wait_for("file-transfer-requested", |e| {
        matches!(e, SessionEvent::TransferRequested(_))
    })
    .await
    .unwrap();
    bob.handle
        .reject_file_transfer(record.id.clone())
        .await
        .unwrap();

    let rejected = alice
        .wait_for("file-transfer-rejected", |e| {
            matches!(e, SessionEvent::TransferRejected(_))
        })
        .await
        .unwrap();
    let SessionEvent::TransferRejected(rejected) = rejected else {
        unreachable!()
    };
    assert_eq!(rejected.id, record.id);
    assert_eq!(rejected.status, TransferStatus::Rejected);
    assert!(alice.handle.transfers().await.unwrap().is_empty());
    assert!(alice.sink.names_among(&["file-transfer-progress"]).is_empty());

    // Settled transfers cannot be accepted afterwards
    assert!(bob.handle.accept_file_transfer(record.id).await.is_err());
    assert!(bob.handle.transfers().await.unwrap().is_empty());
}
