use peerlink_core::{PeerId, RoomId, TransferId, TransitionError};
use thiserror::Error;

/// Failures surfaced across component boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Connect timed out or was refused. Fatal until `initialize` is retried.
    #[error("signaling relay unreachable: {0}")]
    SignalingUnreachable(String),

    /// The relay rejected or never confirmed the join.
    #[error("failed to join room {room_id}: {reason}")]
    RoomJoinFailed { room_id: RoomId, reason: String },

    #[error("negotiation with {peer_id} failed: {reason}")]
    NegotiationFailed { peer_id: PeerId, reason: String },

    #[error("no open channel to {0}")]
    DeliverySendFailed(PeerId),

    #[error("message to {0} was never acknowledged")]
    DeliveryTimeout(PeerId),

    #[error("transfer request {0} could not be sent")]
    TransferRequestFailed(TransferId),

    #[error("transfer {id} failed mid-stream: {reason}")]
    TransferChunkError { id: TransferId, reason: String },

    /// The file cannot be described with the configured chunk size.
    #[error("transfer {id} refused: {reason}")]
    TransferRefused { id: TransferId, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("not connected to the signaling relay")]
    NotConnected,

    #[error("not in a room")]
    NotInRoom,

    #[error("unknown transfer {0}")]
    UnknownTransfer(TransferId),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("session task has shut down")]
    SessionClosed,
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
