use crate::connection::{ConnectionInfo, PeerRecord};
use crate::error::Result;
use crate::transfer::FileSource;
use peerlink_core::{FileTransferRecord, Message, MessageId, PeerId, RoomId, TransferId};
use tokio::sync::oneshot;

/// Requests from a [`crate::SessionHandle`] to the session task. Each one
/// carries the channel its outcome is reported on.
pub enum SessionCommand {
    Initialize {
        endpoint: String,
        reply: oneshot::Sender<Result<PeerId>>,
    },
    JoinRoom {
        room_id: RoomId,
        reply: oneshot::Sender<Result<Vec<PeerId>>>,
    },
    LeaveRoom {
        reply: oneshot::Sender<Option<RoomId>>,
    },
    SendMessage {
        recipient: PeerId,
        content: String,
        reply_to: Option<MessageId>,
        reply: oneshot::Sender<Message>,
    },
    BroadcastMessage {
        content: String,
        reply: oneshot::Sender<Vec<Message>>,
    },
    InitiateFileTransfer {
        recipient: PeerId,
        file: FileSource,
        reply: oneshot::Sender<Result<FileTransferRecord>>,
    },
    AcceptFileTransfer {
        transfer_id: TransferId,
        reply: oneshot::Sender<Result<()>>,
    },
    RejectFileTransfer {
        transfer_id: TransferId,
        reply: oneshot::Sender<Result<()>>,
    },
    CancelFileTransfer {
        transfer_id: TransferId,
        reply: oneshot::Sender<Result<()>>,
    },
    Peers {
        reply: oneshot::Sender<Vec<PeerRecord>>,
    },
    Connection {
        peer_id: PeerId,
        reply: oneshot::Sender<Option<ConnectionInfo>>,
    },
    Messages {
        reply: oneshot::Sender<Vec<Message>>,
    },
    Transfers {
        reply: oneshot::Sender<Vec<FileTransferRecord>>,
    },
    ClearHistory,
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}
