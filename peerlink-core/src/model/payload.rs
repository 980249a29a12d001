use crate::model::message::MessageId;
use crate::model::transfer::TransferId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One frame on a direct channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelData {
    Text(String),
    Binary(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferAction {
    Request,
    Accept,
    Reject,
    Cancel,
}

/// JSON payloads carried as text frames on a direct channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ChannelPayload {
    Message {
        id: MessageId,
        content: String,
        timestamp: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_to: Option<MessageId>,
    },
    DeliveryConfirmation {
        message_id: MessageId,
        timestamp: u64,
    },
    FileTransfer {
        action: TransferAction,
        transfer_id: TransferId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_size: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chunk_size: Option<u32>,
    },
}

impl ChannelPayload {
    /// A bare transfer control payload (accept, reject, cancel).
    pub fn transfer_action(action: TransferAction, transfer_id: TransferId) -> Self {
        ChannelPayload::FileTransfer {
            action,
            transfer_id,
            file_name: None,
            file_size: None,
            file_type: None,
            chunk_size: None,
        }
    }

    pub fn to_data(&self) -> serde_json::Result<ChannelData> {
        serde_json::to_string(self).map(ChannelData::Text)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Binary chunk frame: `{transferId, index}` plus raw bytes, outside the JSON
/// payload stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFrame {
    pub transfer_id: TransferId,
    pub index: u32,
    pub checksum: Option<[u8; 32]>,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl ChunkFrame {
    pub fn encode(&self) -> Result<Bytes, postcard::Error> {
        postcard::to_allocvec(self).map(Bytes::from)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
