use crate::connection::ConnectionUpdate;
use crate::session::Session;
use crate::transport::TransportEvent;
use peerlink_core::{ChannelData, ChannelPayload, PeerId};
use tracing::{debug, warn};

impl Session {
    pub(super) async fn handle_transport_event(&mut self, event: TransportEvent) {
        let Some(update) = self.connections.handle_transport_event(event).await else {
            return;
        };

        match update {
            ConnectionUpdate::Connected(_) => {}

            ConnectionUpdate::ChannelOpen(peer_id) => {
                self.renegotiations.remove(&peer_id);
            }

            ConnectionUpdate::Disconnected(peer_id) => {
                self.transfers.forget_peer(&peer_id);
                self.recover_peer(peer_id).await;
            }

            ConnectionUpdate::Data(peer_id, ChannelData::Text(text)) => {
                self.handle_payload(peer_id, &text).await;
            }

            ConnectionUpdate::Data(peer_id, ChannelData::Binary(bytes)) => {
                self.transfers
                    .handle_chunk(&self.connections, &peer_id, &bytes)
                    .await;
            }

            ConnectionUpdate::LocalCandidate(peer_id, candidate) => {
                if let Err(e) = self
                    .signaling
                    .relay_ice_candidate(peer_id.clone(), candidate)
                    .await
                {
                    debug!("Candidate for {} not relayed: {}", peer_id, e);
                }
            }
        }
    }

    async fn handle_payload(&mut self, from: PeerId, text: &str) {
        let payload = match ChannelPayload::from_json(text) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Invalid payload from {}: {}", from, e);
                return;
            }
        };

        match payload {
            ChannelPayload::Message {
                id,
                content,
                timestamp,
                reply_to,
            } => {
                self.delivery
                    .handle_inbound(&self.connections, from, id, content, timestamp, reply_to)
                    .await;
            }

            ChannelPayload::DeliveryConfirmation { message_id, .. } => {
                self.delivery.handle_confirmation(&from, &message_id);
            }

            transfer @ ChannelPayload::FileTransfer { .. } => {
                if let Err(e) = self
                    .transfers
                    .handle_control(&self.connections, &from, transfer)
                    .await
                {
                    warn!("Transfer payload from {} not applied: {}", from, e);
                }
            }
        }
    }
}
