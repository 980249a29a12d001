use peerlink_core::{ChannelData, PeerId};

/// Identifies one transport session. A peer that is renegotiated gets a new
/// id, so late events from the old session can be told apart.
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// What a transport session reports back to the session loop.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    StateChanged(TransportState),

    /// The direct channel is open and ready for writes.
    ChannelOpen(String),

    ChannelClosed,

    /// A frame arrived on the direct channel.
    Data(ChannelData),

    /// A local ICE candidate was gathered and must be relayed to the peer.
    CandidateGenerated(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub peer_id: PeerId,
    pub session_id: SessionId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(peer_id: PeerId, session_id: SessionId, kind: TransportEventKind) -> Self {
        Self {
            peer_id,
            session_id,
            kind,
        }
    }
}
