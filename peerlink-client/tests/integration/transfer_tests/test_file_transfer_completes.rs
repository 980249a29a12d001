use peerlink_client::{ClientConfig, FileSource, SessionEvent};
use peerlink_core::TransferStatus;

use crate::integration::init_tracing;
use crate::utils::{LoopbackNetwork, connected_pair, spawn_relay};

#[tokio::test]
async fn test_file_transfer_completes() {
    init_tracing();

    let mut config = ClientConfig::default();
    config.transfer.chunk_size = 1024;

    let relay = spawn_relay().await.expect("Failed to start relay");
    let network = LoopbackNetwork::new();
    let (mut alice, mut bob) = connected_pair(&network, &relay, config).await.unwrap();

    let content: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    let file = FileSource::new("report.pdf", "application/pdf", content.clone());

    let record = alice
        .handle
        .initiate_file_transfer(bob.id(), file)
        .await
        .unwrap();
    assert_eq!(record.status, TransferStatus::Pending);
    assert_eq!(record.total_chunks(), 4);
    assert!(record.chunks.is_empty());

    let requested = bob
        .wait_for("file-transfer-requested", |e| {
            matches!(e, SessionEvent::TransferRequested(_))
        })
        .await
        .unwrap();
    let SessionEvent::TransferRequested(requested) = requested else {
        unreachable!()
    };
    assert_eq!(requested.id, record.id);
    assert_eq!(requested.file_name, "report.pdf");
    assert_eq!(requested.file_size, 4096);

    bob.handle
        .accept_file_transfer(requested.id.clone())
        .await
        .unwrap();

    let completed = bob
        .wait_for("file-transfer-completed", |e| {
            matches!(e, SessionEvent::TransferCompleted { .. })
        })
        .await
        .unwrap();
    let SessionEvent::TransferCompleted { record: done, data } = completed else {
        unreachable!()
    };
    assert_eq!(done.status, TransferStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.chunks.len(), 4);
    assert_eq!(data.as_deref(), Some(content.as_slice()));

    let sent = alice
        .wait_for("file-transfer-completed", |e| {
            matches!(e, SessionEvent::TransferCompleted { .. })
        })
        .await
        .unwrap();
    let SessionEvent::TransferCompleted { record: sent, data } = sent else {
        unreachable!()
    };
    assert_eq!(sent.status, TransferStatus::Completed);
    assert!(data.is_none());

    assert_eq!(
        bob.sink.names_among(&["file-transfer-progress"]).len(),
        4,
        "one progress event per chunk"
    );
    assert!(alice.handle.transfers().await.unwrap().is_empty());
}
