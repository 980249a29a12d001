use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Failed,
}

impl MessageStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, MessageStatus::Delivered | MessageStatus::Failed)
    }

    /// Status only moves forward: sending -> sent -> {delivered, failed},
    /// or sending -> failed when nothing could be sent at all.
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (MessageStatus::Sending, MessageStatus::Sent)
                | (MessageStatus::Sending, MessageStatus::Failed)
                | (MessageStatus::Sent, MessageStatus::Delivered)
                | (MessageStatus::Sent, MessageStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: PeerId,
    pub recipient_id: PeerId,
    pub content: String,
    pub timestamp: u64,
    pub status: MessageStatus,
    pub reply_to: Option<MessageId>,
}

impl Message {
    pub fn outgoing(
        sender_id: PeerId,
        recipient_id: PeerId,
        content: String,
        reply_to: Option<MessageId>,
        timestamp: u64,
    ) -> Self {
        Self {
            id: MessageId::new(),
            sender_id,
            recipient_id,
            content,
            timestamp,
            status: MessageStatus::Sending,
            reply_to,
        }
    }

    /// Applies `next` if it moves the status forward. Returns whether it did.
    pub fn advance(&mut self, next: MessageStatus) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        true
    }
}
