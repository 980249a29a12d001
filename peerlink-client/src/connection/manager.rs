use crate::bus::{EventBus, SessionEvent};
use crate::config::TransportConfig;
use crate::connection::{
    ConnectionInfo, ConnectionRecord, ConnectionStatus, PeerRecord, PeerStatus, Role,
};
use crate::transport::{
    SessionId, TransportEvent, TransportEventKind, TransportProvider, TransportState,
};
use async_trait::async_trait;
use peerlink_core::{ChannelData, IceServerConfig, PeerId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Send capability handed to the message and transfer layers. They never see
/// connection internals.
#[async_trait]
pub trait PeerSender: Send + Sync {
    /// Writes one frame to the peer's direct channel. Returns false when no
    /// open channel exists or the write failed.
    async fn send_data(&self, peer_id: &PeerId, data: ChannelData) -> bool;

    /// Peers with an open direct channel.
    fn open_peers(&self) -> Vec<PeerId>;
}

/// What a transport event meant, for the session loop to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionUpdate {
    Connected(PeerId),
    Disconnected(PeerId),
    ChannelOpen(PeerId),
    Data(PeerId, ChannelData),
    LocalCandidate(PeerId, String),
}

/// Owns every [`PeerRecord`] and [`ConnectionRecord`]. At most one transport
/// session exists per peer; a replacement always closes the previous one.
pub struct ConnectionManager {
    local_id: PeerId,
    provider: Arc<dyn TransportProvider>,
    config: TransportConfig,
    bus: EventBus,
    peers: HashMap<PeerId, PeerRecord>,
    connections: HashMap<PeerId, ConnectionRecord>,
    transport_tx: mpsc::Sender<TransportEvent>,
    next_session: SessionId,
}

impl ConnectionManager {
    pub fn new(
        local_id: PeerId,
        provider: Arc<dyn TransportProvider>,
        config: TransportConfig,
        bus: EventBus,
        transport_tx: mpsc::Sender<TransportEvent>,
    ) -> Self {
        Self {
            local_id,
            provider,
            config,
            bus,
            peers: HashMap::new(),
            connections: HashMap::new(),
            transport_tx,
            next_session: 1,
        }
    }

    pub fn set_ice_servers(&mut self, ice_servers: Vec<IceServerConfig>) {
        self.config.ice_servers = ice_servers;
    }

    /// Registers a room member. Returns false if it was already known.
    pub fn add_peer(&mut self, peer_id: PeerId) -> bool {
        if peer_id == self.local_id || self.peers.contains_key(&peer_id) {
            return false;
        }
        debug!("Tracking peer {}", peer_id);
        self.peers.insert(peer_id.clone(), PeerRecord::new(peer_id));
        true
    }

    /// The lexicographically smaller id offers; the other side waits.
    pub fn is_initiator_for(&self, peer_id: &PeerId) -> bool {
        self.local_id < *peer_id
    }

    /// True once the peer is connected with an open direct channel.
    pub fn is_established(&self, peer_id: &PeerId) -> bool {
        self.connections
            .get(peer_id)
            .is_some_and(|r| r.status == ConnectionStatus::Connected && r.is_open())
    }

    /// Starts negotiation towards a known peer, replacing any session that
    /// is not established. Returns the offer to relay.
    pub async fn initiate(&mut self, peer_id: &PeerId) -> Option<String> {
        if !self.peers.contains_key(peer_id) {
            warn!("Refusing to negotiate with unknown peer {}", peer_id);
            return None;
        }
        if self.is_established(peer_id) {
            debug!("Already connected to {}", peer_id);
            return None;
        }

        let record = self.open_session(peer_id, Role::Initiator).await?;
        let offer: anyhow::Result<String> = async {
            record.session.create_channel(&self.config.channel_label).await?;
            record.session.create_offer().await
        }
        .await;

        self.connections.insert(peer_id.clone(), record);

        match offer {
            Ok(sdp) => {
                info!("Offer created for {}", peer_id);
                self.set_status(peer_id, ConnectionStatus::Connecting);
                Some(sdp)
            }
            Err(e) => {
                self.fail_peer(peer_id, format!("offer failed: {:#}", e)).await;
                None
            }
        }
    }

    /// Applies a relayed offer and returns the answer to relay back.
    pub async fn handle_offer(&mut self, from: &PeerId, sdp: String) -> Option<String> {
        if let Some(existing) = self.connections.get(from) {
            let glare = existing.role == Role::Initiator
                && existing.status == ConnectionStatus::Connecting;
            if glare && self.is_initiator_for(from) {
                info!("Ignoring colliding offer from {}, local offer wins", from);
                return None;
            }
        }

        // An offer proves the sender is in the room even if its join
        // notice has not been seen yet.
        self.add_peer(from.clone());

        let record = self.open_session(from, Role::Responder).await?;
        let answer: anyhow::Result<String> = async {
            record.session.apply_offer(sdp).await?;
            record.session.create_answer().await
        }
        .await;

        self.connections.insert(from.clone(), record);

        match answer {
            Ok(sdp) => {
                info!("Answer created for {}", from);
                self.set_status(from, ConnectionStatus::Connecting);
                Some(sdp)
            }
            Err(e) => {
                self.fail_peer(from, format!("answer failed: {:#}", e)).await;
                None
            }
        }
    }

    pub async fn handle_answer(&mut self, from: &PeerId, sdp: String) {
        let Some(record) = self.connections.get(from) else {
            warn!("Answer from {} without a pending offer", from);
            return;
        };
        if record.role != Role::Initiator || record.status != ConnectionStatus::Connecting {
            warn!("Unexpected answer from {} in {:?}", from, record.status);
            return;
        }

        let applied = record.session.apply_answer(sdp).await;
        if let Err(e) = applied {
            self.fail_peer(from, format!("answer rejected: {:#}", e)).await;
        }
    }

    pub async fn add_remote_candidate(&mut self, from: &PeerId, candidate: String) {
        let Some(record) = self.connections.get(from) else {
            debug!("Dropping candidate from {}: no session", from);
            return;
        };
        if matches!(
            record.status,
            ConnectionStatus::Failed | ConnectionStatus::Disconnected
        ) {
            return;
        }

        let applied = record.session.add_ice_candidate(candidate).await;
        if let Err(e) = applied {
            self.fail_peer(from, format!("candidate rejected: {:#}", e)).await;
        }
    }

    /// Folds one transport event into the records. Events from sessions
    /// that were already replaced or torn down are dropped.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) -> Option<ConnectionUpdate> {
        let TransportEvent {
            peer_id,
            session_id,
            kind,
        } = event;

        let Some(record) = self.connections.get_mut(&peer_id) else {
            return None;
        };
        if record.session_id != session_id {
            debug!("Stale transport event for {} (session {})", peer_id, session_id);
            return None;
        }

        match kind {
            TransportEventKind::StateChanged(TransportState::Connected) => {
                if record.status == ConnectionStatus::Connected {
                    return None;
                }
                record.touch();
                self.set_status(&peer_id, ConnectionStatus::Connected);
                info!("Peer {} connected", peer_id);
                self.bus.publish(SessionEvent::PeerConnected {
                    peer_id: peer_id.clone(),
                });
                Some(ConnectionUpdate::Connected(peer_id))
            }

            TransportEventKind::StateChanged(
                TransportState::Disconnected | TransportState::Failed | TransportState::Closed,
            ) => {
                info!("Transport to {} went down", peer_id);
                self.remove_peer(&peer_id).await;
                Some(ConnectionUpdate::Disconnected(peer_id))
            }

            TransportEventKind::StateChanged(_) => None,

            TransportEventKind::ChannelOpen(label) => {
                record.channel = Some(label);
                record.touch();
                self.bus.publish(SessionEvent::ChannelOpen {
                    peer_id: peer_id.clone(),
                });
                Some(ConnectionUpdate::ChannelOpen(peer_id))
            }

            TransportEventKind::ChannelClosed => {
                debug!("Channel to {} closed", peer_id);
                record.channel = None;
                None
            }

            TransportEventKind::Data(data) => {
                record.touch();
                Some(ConnectionUpdate::Data(peer_id, data))
            }

            TransportEventKind::CandidateGenerated(candidate) => {
                Some(ConnectionUpdate::LocalCandidate(peer_id, candidate))
            }
        }
    }

    /// Tears down the peer's session and drops both of its records.
    /// Returns whether anything was known about the peer.
    pub async fn remove_peer(&mut self, peer_id: &PeerId) -> bool {
        let peer = self.peers.remove(peer_id);
        let connection = self.connections.remove(peer_id);

        if let Some(record) = &connection {
            if let Err(e) = record.session.close().await {
                warn!("Failed to close session for {}: {:?}", peer_id, e);
            }
            self.bus.publish(SessionEvent::PeerDisconnected {
                peer_id: peer_id.clone(),
            });
        }

        peer.is_some() || connection.is_some()
    }

    /// Tears down every session in peer id order.
    pub async fn close_all(&mut self) {
        let mut ids: Vec<PeerId> = self.peers.keys().cloned().collect();
        ids.sort();

        for peer_id in ids {
            self.remove_peer(&peer_id).await;
        }
        if !self.connections.is_empty() {
            error!("{} orphaned connection records", self.connections.len());
            self.connections.clear();
        }
        info!("All peer sessions closed");
    }

    /// Marks the peer's connection failed and closes its session. The peer
    /// record stays; a later negotiation replaces the failed connection.
    pub async fn fail_peer(&mut self, peer_id: &PeerId, reason: String) {
        error!("Negotiation with {} failed: {}", peer_id, reason);

        if let Some(record) = self.connections.get_mut(peer_id) {
            record.status = ConnectionStatus::Failed;
            record.channel = None;
            if let Err(e) = record.session.close().await {
                debug!("Close after failure for {}: {:?}", peer_id, e);
            }
        }
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.status = PeerStatus::Disconnected;
        }

        self.bus.publish(SessionEvent::NegotiationFailed {
            peer_id: peer_id.clone(),
            reason,
        });
    }

    pub fn peers(&self) -> Vec<PeerRecord> {
        let mut peers: Vec<PeerRecord> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        peers
    }

    pub fn peer(&self, peer_id: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(peer_id)
    }

    pub fn connection(&self, peer_id: &PeerId) -> Option<ConnectionInfo> {
        self.connections.get(peer_id).map(ConnectionRecord::snapshot)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    async fn open_session(&mut self, peer_id: &PeerId, role: Role) -> Option<ConnectionRecord> {
        let mut reconnect_attempts = 0;
        if let Some(previous) = self.connections.remove(peer_id) {
            debug!("Replacing session {} for {}", previous.session_id, peer_id);
            if let Err(e) = previous.session.close().await {
                warn!("Failed to close previous session for {}: {:?}", peer_id, e);
            }
            reconnect_attempts = previous.reconnect_attempts + 1;
        }

        let session_id = self.next_session;
        self.next_session += 1;

        let session = match self
            .provider
            .create_session(
                peer_id.clone(),
                session_id,
                &self.config.ice_servers,
                self.transport_tx.clone(),
            )
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.fail_peer(peer_id, format!("session setup failed: {:#}", e))
                    .await;
                return None;
            }
        };

        let mut record = ConnectionRecord::new(peer_id.clone(), role, session_id, session);
        record.reconnect_attempts = reconnect_attempts;
        Some(record)
    }

    fn set_status(&mut self, peer_id: &PeerId, status: ConnectionStatus) {
        if let Some(record) = self.connections.get_mut(peer_id) {
            record.status = status;
        }
        let peer_status = match status {
            ConnectionStatus::New => PeerStatus::Online,
            ConnectionStatus::Connecting => PeerStatus::Connecting,
            ConnectionStatus::Connected => PeerStatus::Connected,
            ConnectionStatus::Disconnected | ConnectionStatus::Failed => PeerStatus::Disconnected,
        };
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.status = peer_status;
        }
    }
}

#[async_trait]
impl PeerSender for ConnectionManager {
    async fn send_data(&self, peer_id: &PeerId, data: ChannelData) -> bool {
        let Some(record) = self.connections.get(peer_id) else {
            return false;
        };
        if !record.is_open() {
            return false;
        }
        match record.session.send(data).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Send to {} failed: {:?}", peer_id, e);
                false
            }
        }
    }

    fn open_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .connections
            .values()
            .filter(|r| r.is_open())
            .map(|r| r.peer_id.clone())
            .collect();
        peers.sort();
        peers
    }
}
