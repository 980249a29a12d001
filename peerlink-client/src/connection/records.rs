use crate::transport::{SessionId, TransportSession};
use peerlink_core::PeerId;
use std::fmt;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Online,
    Connecting,
    Connected,
    Disconnected,
}

/// A peer known from the room, whether or not a session exists for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub display_name: String,
    pub status: PeerStatus,
}

impl PeerRecord {
    pub fn new(peer_id: PeerId) -> Self {
        let display_name = peer_id.to_string();
        Self {
            peer_id,
            display_name,
            status: PeerStatus::Online,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

pub struct ConnectionRecord {
    pub peer_id: PeerId,
    pub status: ConnectionStatus,
    pub role: Role,
    pub session_id: SessionId,
    pub session: Box<dyn TransportSession>,
    /// Label of the open direct channel, if any.
    pub channel: Option<String>,
    pub last_activity: Instant,
    pub reconnect_attempts: u32,
}

impl ConnectionRecord {
    pub fn new(
        peer_id: PeerId,
        role: Role,
        session_id: SessionId,
        session: Box<dyn TransportSession>,
    ) -> Self {
        Self {
            peer_id,
            status: ConnectionStatus::New,
            role,
            session_id,
            session,
            channel: None,
            last_activity: Instant::now(),
            reconnect_attempts: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some() && self.status != ConnectionStatus::Failed
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn snapshot(&self) -> ConnectionInfo {
        ConnectionInfo {
            peer_id: self.peer_id.clone(),
            status: self.status,
            role: self.role,
            channel_open: self.channel.is_some(),
            reconnect_attempts: self.reconnect_attempts,
        }
    }
}

impl fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("peer_id", &self.peer_id)
            .field("status", &self.status)
            .field("role", &self.role)
            .field("session_id", &self.session_id)
            .field("channel", &self.channel)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .finish()
    }
}

/// Read-only view of a [`ConnectionRecord`] handed out of the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub peer_id: PeerId,
    pub status: ConnectionStatus,
    pub role: Role,
    pub channel_open: bool,
    pub reconnect_attempts: u32,
}
