mod message;
mod payload;
mod peer;
mod room;
mod signaling;
mod transfer;

pub use message::{Message, MessageId, MessageStatus};
pub use payload::{ChannelData, ChannelPayload, ChunkFrame, TransferAction};
pub use peer::PeerId;
pub use room::RoomId;
pub use signaling::{IceServerConfig, SignalEnvelope, SignalMessage};
pub use transfer::{
    ChunkDescriptor, ChunkLayoutError, FileTransferRecord, TransferId, TransferStatus,
    TransitionError, chunk_checksum, chunk_count, progress_percent,
};
