use crate::error::SessionError;
use bytes::Bytes;
use dashmap::DashMap;
use peerlink_core::{FileTransferRecord, Message, PeerId, RoomId, TransferId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Every state transition the session announces.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignalingConnected { local_id: PeerId },
    SignalingDisconnected,
    Reconnecting { attempt: u32, delay: Duration },
    ReconnectFailed { attempts: u32 },

    RoomJoined { room_id: RoomId, existing_members: Vec<PeerId> },
    RoomJoinFailed { room_id: RoomId, reason: String },
    RoomLeft { room_id: RoomId },
    PeerJoined { peer_id: PeerId },
    PeerLeft { peer_id: PeerId },

    PeerConnected { peer_id: PeerId },
    PeerDisconnected { peer_id: PeerId },
    ChannelOpen { peer_id: PeerId },
    NegotiationFailed { peer_id: PeerId, reason: String },

    MessageSent(Message),
    MessageDelivered(Message),
    MessageFailed { message: Message, error: SessionError },
    MessageReceived(Message),

    TransferInitiated(FileTransferRecord),
    TransferRequested(FileTransferRecord),
    TransferAccepted(FileTransferRecord),
    TransferRejected(FileTransferRecord),
    TransferStarted(FileTransferRecord),
    TransferProgress { transfer_id: TransferId, progress: u8 },
    /// `data` holds the assembled file on the receiving side.
    TransferCompleted { record: FileTransferRecord, data: Option<Bytes> },
    TransferFailed(FileTransferRecord),
    TransferCancelled(FileTransferRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    Signaling,
    Room,
    Peer,
    Message,
    Transfer,
}

impl SessionEvent {
    pub fn topic(&self) -> EventTopic {
        use SessionEvent::*;

        match self {
            SignalingConnected { .. }
            | SignalingDisconnected
            | Reconnecting { .. }
            | ReconnectFailed { .. } => EventTopic::Signaling,
            RoomJoined { .. }
            | RoomJoinFailed { .. }
            | RoomLeft { .. }
            | PeerJoined { .. }
            | PeerLeft { .. } => EventTopic::Room,
            PeerConnected { .. }
            | PeerDisconnected { .. }
            | ChannelOpen { .. }
            | NegotiationFailed { .. } => EventTopic::Peer,
            MessageSent(_) | MessageDelivered(_) | MessageFailed { .. } | MessageReceived(_) => {
                EventTopic::Message
            }
            _ => EventTopic::Transfer,
        }
    }

    /// Wire-style name of the event, used in logs.
    pub fn name(&self) -> &'static str {
        use SessionEvent::*;

        match self {
            SignalingConnected { .. } => "signaling-connected",
            SignalingDisconnected => "signaling-disconnected",
            Reconnecting { .. } => "reconnecting",
            ReconnectFailed { .. } => "reconnect-failed",
            RoomJoined { .. } => "room-joined",
            RoomJoinFailed { .. } => "room-join-failed",
            RoomLeft { .. } => "room-left",
            PeerJoined { .. } => "peer-joined",
            PeerLeft { .. } => "peer-left",
            PeerConnected { .. } => "peer-connected",
            PeerDisconnected { .. } => "peer-disconnected",
            ChannelOpen { .. } => "channel-open",
            NegotiationFailed { .. } => "negotiation-failed",
            MessageSent(_) => "message-sent",
            MessageDelivered(_) => "message-delivered",
            MessageFailed { .. } => "message-failed",
            MessageReceived(_) => "message-received",
            TransferInitiated(_) => "file-transfer-initiated",
            TransferRequested(_) => "file-transfer-requested",
            TransferAccepted(_) => "file-transfer-accepted",
            TransferRejected(_) => "file-transfer-rejected",
            TransferStarted(_) => "file-transfer-started",
            TransferProgress { .. } => "file-transfer-progress",
            TransferCompleted { .. } => "file-transfer-completed",
            TransferFailed(_) => "file-transfer-failed",
            TransferCancelled(_) => "file-transfer-cancelled",
        }
    }
}

/// Narrow hook for mirroring session state into an outer store. Called
/// synchronously on publish, before queued subscribers see the event.
pub trait StateSink: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

struct Subscriber {
    topics: Option<Vec<EventTopic>>,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Subscriber {
    fn wants(&self, topic: EventTopic) -> bool {
        match &self.topics {
            Some(topics) => topics.contains(&topic),
            None => true,
        }
    }
}

#[derive(Default)]
struct BusInner {
    subscribers: DashMap<u64, Subscriber>,
    sinks: DashMap<u64, Arc<dyn StateSink>>,
    next_id: AtomicU64,
}

/// Process-local publish/subscribe dispatcher owned by one session.
/// Clones share the same subscriber set.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives every event published from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.register(None)
    }

    /// Receives only events whose topic is listed.
    pub fn subscribe_topics(&self, topics: &[EventTopic]) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.register(Some(topics.to_vec()))
    }

    pub fn attach_sink(&self, sink: Arc<dyn StateSink>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.sinks.insert(id, sink);
    }

    pub fn publish(&self, event: SessionEvent) {
        debug!("event: {}", event.name());

        for sink in self.inner.sinks.iter() {
            sink.value().on_event(&event);
        }

        let topic = event.topic();
        let mut closed = Vec::new();
        for entry in self.inner.subscribers.iter() {
            let subscriber = entry.value();
            if !subscriber.wants(topic) {
                continue;
            }
            if subscriber.tx.send(event.clone()).is_err() {
                closed.push(*entry.key());
            }
        }

        // Removal happens after iteration, the iterator holds shard guards.
        for id in closed {
            self.inner.subscribers.remove(&id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    fn register(&self, topics: Option<Vec<EventTopic>>) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.insert(id, Subscriber { topics, tx });
        rx
    }
}
