use crate::bus::{EventBus, SessionEvent};
use crate::config::DeliveryConfig;
use crate::connection::PeerSender;
use crate::error::SessionError;
use peerlink_core::utils::now_millis;
use peerlink_core::{ChannelPayload, Message, MessageId, MessageStatus, PeerId};
use std::collections::{HashMap, HashSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

struct PendingDelivery {
    message: Message,
    attempts: u32,
    last_attempt: Instant,
}

/// Tracks outbound messages until they are acknowledged or run out of
/// attempts, and de-duplicates inbound ones.
pub struct DeliveryTracker {
    local_id: PeerId,
    config: DeliveryConfig,
    bus: EventBus,
    history: Vec<Message>,
    pending: HashMap<MessageId, PendingDelivery>,
    seen: HashSet<(PeerId, MessageId)>,
}

impl DeliveryTracker {
    pub fn new(local_id: PeerId, config: DeliveryConfig, bus: EventBus) -> Self {
        Self {
            local_id,
            config,
            bus,
            history: Vec::new(),
            pending: HashMap::new(),
            seen: HashSet::new(),
        }
    }

    /// Sends one message. A missing channel fails it right away; otherwise
    /// it waits for a confirmation under the retry policy.
    pub async fn send_message(
        &mut self,
        sender: &dyn PeerSender,
        recipient: PeerId,
        content: String,
        reply_to: Option<MessageId>,
    ) -> Message {
        let mut message = Message::outgoing(
            self.local_id.clone(),
            recipient.clone(),
            content,
            reply_to,
            now_millis(),
        );

        if self.transmit(sender, &message).await {
            message.advance(MessageStatus::Sent);
            debug!("Message {} sent to {}", message.id, recipient);
            self.pending.insert(
                message.id.clone(),
                PendingDelivery {
                    message: message.clone(),
                    attempts: 1,
                    last_attempt: Instant::now(),
                },
            );
            self.history.push(message.clone());
            self.bus.publish(SessionEvent::MessageSent(message.clone()));
        } else {
            message.advance(MessageStatus::Failed);
            warn!("Message {} to {} failed: no open channel", message.id, recipient);
            self.history.push(message.clone());
            self.bus.publish(SessionEvent::MessageFailed {
                message: message.clone(),
                error: SessionError::DeliverySendFailed(recipient),
            });
        }

        message
    }

    /// Sends `content` as a separate message to every peer with an open
    /// channel.
    pub async fn broadcast(&mut self, sender: &dyn PeerSender, content: String) -> Vec<Message> {
        let mut sent = Vec::new();
        for peer_id in sender.open_peers() {
            let message = self
                .send_message(sender, peer_id, content.clone(), None)
                .await;
            sent.push(message);
        }
        sent
    }

    /// One pass of the retry timer.
    pub async fn sweep(&mut self, sender: &dyn PeerSender) {
        let now = Instant::now();
        let due: Vec<MessageId> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.last_attempt) >= self.config.retry_delay)
            .map(|(id, _)| id.clone())
            .collect();

        for id in due {
            let Some(mut pending) = self.pending.remove(&id) else {
                continue;
            };

            if pending.attempts >= self.config.max_retries {
                error!(
                    "Message {} unacknowledged after {} attempts",
                    id, pending.attempts
                );
                let recipient = pending.message.recipient_id.clone();
                pending.message.advance(MessageStatus::Failed);
                self.update_history(&pending.message);
                self.bus.publish(SessionEvent::MessageFailed {
                    message: pending.message,
                    error: SessionError::DeliveryTimeout(recipient),
                });
                continue;
            }

            pending.attempts += 1;
            pending.last_attempt = now;
            debug!("Resending {} (attempt {})", id, pending.attempts);
            if !self.transmit(sender, &pending.message).await {
                warn!("Resend of {} found no open channel", id);
            }
            self.pending.insert(id, pending);
        }
    }

    /// Remote side confirmed one of our messages.
    pub fn handle_confirmation(&mut self, from: &PeerId, message_id: &MessageId) {
        let Some(pending) = self.pending.get(message_id) else {
            debug!("Confirmation for untracked message {}", message_id);
            return;
        };
        if pending.message.recipient_id != *from {
            warn!("Peer {} confirmed a message sent to someone else", from);
            return;
        }

        let Some(mut pending) = self.pending.remove(message_id) else {
            return;
        };
        if pending.message.advance(MessageStatus::Delivered) {
            info!("Message {} delivered to {}", message_id, from);
            self.update_history(&pending.message);
            self.bus
                .publish(SessionEvent::MessageDelivered(pending.message));
        }
    }

    /// Confirms an inbound message and records it once per distinct id.
    /// Returns the message the first time it is seen.
    pub async fn handle_inbound(
        &mut self,
        sender: &dyn PeerSender,
        from: PeerId,
        id: MessageId,
        content: String,
        timestamp: u64,
        reply_to: Option<MessageId>,
    ) -> Option<Message> {
        let confirmation = ChannelPayload::DeliveryConfirmation {
            message_id: id.clone(),
            timestamp: now_millis(),
        };
        match confirmation.to_data() {
            Ok(data) => {
                if !sender.send_data(&from, data).await {
                    warn!("Could not confirm {} to {}", id, from);
                }
            }
            Err(e) => error!("Failed to serialize confirmation: {}", e),
        }

        if !self.seen.insert((from.clone(), id.clone())) {
            debug!("Duplicate message {} from {}", id, from);
            return None;
        }

        let message = Message {
            id,
            sender_id: from,
            recipient_id: self.local_id.clone(),
            content,
            timestamp,
            status: MessageStatus::Delivered,
            reply_to,
        };
        self.history.push(message.clone());
        self.bus.publish(SessionEvent::MessageReceived(message.clone()));
        Some(message)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.history.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drops the visible history. Messages still awaiting confirmation keep
    /// being tracked, and duplicate suppression stays in force.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Stops tracking everything in flight.
    pub fn stop(&mut self) {
        if !self.pending.is_empty() {
            info!("Dropping {} unacknowledged messages", self.pending.len());
        }
        self.pending.clear();
    }

    async fn transmit(&self, sender: &dyn PeerSender, message: &Message) -> bool {
        let payload = ChannelPayload::Message {
            id: message.id.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp,
            reply_to: message.reply_to.clone(),
        };
        match payload.to_data() {
            Ok(data) => sender.send_data(&message.recipient_id, data).await,
            Err(e) => {
                error!("Failed to serialize message {}: {}", message.id, e);
                false
            }
        }
    }

    fn update_history(&mut self, message: &Message) {
        let entry = self
            .history
            .iter_mut()
            .rev()
            .find(|m| m.id == message.id && m.sender_id == self.local_id);
        if let Some(entry) = entry {
            entry.status = message.status;
        }
    }
}
