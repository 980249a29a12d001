use crate::model::peer::PeerId;
use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Messages exchanged with the relay. Negotiation payloads (`offer`,
/// `answer`, `candidate`) are opaque to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum SignalMessage {
    Welcome {
        peer_id: PeerId,
    },
    IceConfig {
        ice_servers: Vec<IceServerConfig>,
    },
    JoinRoom {
        room_id: RoomId,
    },
    RoomJoined {
        room_id: RoomId,
        peers: Vec<PeerId>,
    },
    JoinRejected {
        room_id: RoomId,
        reason: String,
    },
    PeerJoined {
        peer_id: PeerId,
    },
    PeerLeft {
        peer_id: PeerId,
    },
    LeaveRoom,
    Offer {
        target: PeerId,
        offer: String,
    },
    Answer {
        target: PeerId,
        answer: String,
    },
    IceCandidate {
        target: PeerId,
        candidate: String,
    },
}

impl SignalMessage {
    /// Target of a relayed negotiation payload.
    pub fn target(&self) -> Option<&PeerId> {
        match self {
            SignalMessage::Offer { target, .. }
            | SignalMessage::Answer { target, .. }
            | SignalMessage::IceCandidate { target, .. } => Some(target),
            _ => None,
        }
    }
}

/// A signal as it travels on the wire. `sender` is stamped by the relay and
/// whatever a client puts there is overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    #[serde(flatten)]
    pub message: SignalMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<PeerId>,
    #[serde(default)]
    pub timestamp: u64,
}

impl SignalEnvelope {
    pub fn new(message: SignalMessage, timestamp: u64) -> Self {
        Self {
            message,
            sender: None,
            timestamp,
        }
    }

    pub fn from_sender(message: SignalMessage, sender: PeerId, timestamp: u64) -> Self {
        Self {
            message,
            sender: Some(sender),
            timestamp,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
