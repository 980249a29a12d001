use crate::bus::{EventBus, EventTopic, SessionEvent, StateSink};
use crate::config::ClientConfig;
use crate::connection::{ConnectionInfo, PeerRecord};
use crate::error::{Result, SessionError};
use crate::session::{Session, SessionCommand};
use crate::signaling::{RelayLink, WebSocketRelayLink};
use crate::transfer::FileSource;
use crate::transport::{TransportProvider, WebRtcTransport};
use peerlink_core::{FileTransferRecord, Message, MessageId, PeerId, RoomId, TransferId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Cloneable front door to a running session task. The task stops once
/// every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    local_id: PeerId,
    bus: EventBus,
    command_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Spawns a session with a random id over WebRTC and a WebSocket relay link.
    pub fn spawn(config: ClientConfig) -> Self {
        Self::spawn_with(
            PeerId::new(),
            config,
            Arc::new(WebRtcTransport::new()),
            Box::new(WebSocketRelayLink::new()),
        )
    }

    /// Spawns a session on the current runtime with the given collaborators.
    pub fn spawn_with(
        local_id: PeerId,
        config: ClientConfig,
        provider: Arc<dyn TransportProvider>,
        link: Box<dyn RelayLink>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let bus = EventBus::new();

        let session = Session::new(local_id.clone(), config, bus.clone(), provider, link, command_rx);
        tokio::spawn(session.run());

        Self {
            local_id,
            bus,
            command_tx,
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.bus.subscribe()
    }

    pub fn subscribe_topics(&self, topics: &[EventTopic]) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.bus.subscribe_topics(topics)
    }

    pub fn attach_sink(&self, sink: Arc<dyn StateSink>) {
        self.bus.attach_sink(sink);
    }

    /// Connects to the relay at `endpoint` (e.g. `ws://host:port`).
    pub async fn initialize(&self, endpoint: impl Into<String>) -> Result<PeerId> {
        let endpoint = endpoint.into();
        self.request(|reply| SessionCommand::Initialize { endpoint, reply })
            .await?
    }

    /// Joins `room_id`, leaving any current room first. Resolves with the
    /// members already present once the relay confirms.
    pub async fn join_room(&self, room_id: impl Into<RoomId>) -> Result<Vec<PeerId>> {
        let room_id = room_id.into();
        self.request(|reply| SessionCommand::JoinRoom { room_id, reply })
            .await?
    }

    /// Returns the room that was left, `None` when not in one.
    pub async fn leave_room(&self) -> Result<Option<RoomId>> {
        self.request(|reply| SessionCommand::LeaveRoom { reply }).await
    }

    pub async fn send_message(
        &self,
        recipient: PeerId,
        content: impl Into<String>,
        reply_to: Option<MessageId>,
    ) -> Result<Message> {
        let content = content.into();
        self.request(|reply| SessionCommand::SendMessage {
            recipient,
            content,
            reply_to,
            reply,
        })
        .await
    }

    pub async fn broadcast_message(&self, content: impl Into<String>) -> Result<Vec<Message>> {
        let content = content.into();
        self.request(|reply| SessionCommand::BroadcastMessage { content, reply })
            .await
    }

    pub async fn initiate_file_transfer(
        &self,
        recipient: PeerId,
        file: FileSource,
    ) -> Result<FileTransferRecord> {
        self.request(|reply| SessionCommand::InitiateFileTransfer {
            recipient,
            file,
            reply,
        })
        .await?
    }

    pub async fn accept_file_transfer(&self, transfer_id: TransferId) -> Result<()> {
        self.request(|reply| SessionCommand::AcceptFileTransfer { transfer_id, reply })
            .await?
    }

    pub async fn reject_file_transfer(&self, transfer_id: TransferId) -> Result<()> {
        self.request(|reply| SessionCommand::RejectFileTransfer { transfer_id, reply })
            .await?
    }

    pub async fn cancel_file_transfer(&self, transfer_id: TransferId) -> Result<()> {
        self.request(|reply| SessionCommand::CancelFileTransfer { transfer_id, reply })
            .await?
    }

    pub async fn peers(&self) -> Result<Vec<PeerRecord>> {
        self.request(|reply| SessionCommand::Peers { reply }).await
    }

    pub async fn connection(&self, peer_id: PeerId) -> Result<Option<ConnectionInfo>> {
        self.request(|reply| SessionCommand::Connection { peer_id, reply })
            .await
    }

    pub async fn messages(&self) -> Result<Vec<Message>> {
        self.request(|reply| SessionCommand::Messages { reply }).await
    }

    /// Active transfers.
    pub async fn transfers(&self) -> Result<Vec<FileTransferRecord>> {
        self.request(|reply| SessionCommand::Transfers { reply }).await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.command_tx
            .send(SessionCommand::ClearHistory)
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    /// Leaves the room, closes every peer session and the relay link. The
    /// session can be initialized again afterwards.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Disconnect { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(make(tx))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)
    }
}
