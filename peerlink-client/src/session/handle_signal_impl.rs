use crate::error::SessionError;
use crate::session::Session;
use crate::signaling::{RelayEvent, SignalingInbound};
use peerlink_core::PeerId;
use tracing::{debug, info, warn};

impl Session {
    pub(super) async fn handle_relay_event(&mut self, event: Option<RelayEvent>) {
        match event {
            Some(RelayEvent::Frame(text)) => {
                let Some(inbound) = self.signaling.handle_frame(&text) else {
                    return;
                };
                self.handle_signal(inbound).await;
            }
            Some(RelayEvent::Closed) | None => {
                self.relay_rx = None;
                if self.signaling.on_link_lost().is_none() {
                    self.abandon_join();
                }
            }
        }
    }

    pub(super) async fn reconnect(&mut self) {
        if let Some(rx) = self.signaling.try_reconnect().await {
            self.relay_rx = Some(rx);
        }
    }

    async fn handle_signal(&mut self, inbound: SignalingInbound) {
        match inbound {
            SignalingInbound::IceConfig(ice_servers) => {
                self.connections.set_ice_servers(ice_servers);
            }

            SignalingInbound::RoomJoined {
                room_id,
                members,
                departed,
            } => {
                for peer_id in &departed {
                    self.drop_peer(peer_id).await;
                }
                for peer_id in &members {
                    self.admit_peer(peer_id.clone()).await;
                }
                self.settle_join(&room_id, Ok(members));
            }

            SignalingInbound::JoinRejected { room_id, reason } => {
                let error = SessionError::RoomJoinFailed {
                    room_id: room_id.clone(),
                    reason,
                };
                self.settle_join(&room_id, Err(error));
            }

            SignalingInbound::PeerJoined(peer_id) => self.admit_peer(peer_id).await,

            SignalingInbound::PeerLeft(peer_id) => self.drop_peer(&peer_id).await,

            SignalingInbound::Offer { from, sdp } => {
                if self.signaling.room().is_none() {
                    debug!("Dropping offer from {}: not in a room", from);
                    return;
                }
                let Some(answer) = self.connections.handle_offer(&from, sdp).await else {
                    return;
                };
                if let Err(e) = self.signaling.relay_answer(from.clone(), answer).await {
                    warn!("Failed to relay answer to {}: {}", from, e);
                }
            }

            SignalingInbound::Answer { from, sdp } => {
                self.connections.handle_answer(&from, sdp).await;
            }

            SignalingInbound::Candidate { from, candidate } => {
                self.connections.add_remote_candidate(&from, candidate).await;
            }
        }
    }

    /// Tracks a room member and, when this side is the designated
    /// initiator, negotiates with it unless a channel is already open.
    async fn admit_peer(&mut self, peer_id: PeerId) {
        self.connections.add_peer(peer_id.clone());
        if self.connections.is_established(&peer_id) {
            return;
        }
        if !self.connections.is_initiator_for(&peer_id) {
            debug!("Waiting for {} to offer", peer_id);
            return;
        }

        let Some(offer) = self.connections.initiate(&peer_id).await else {
            return;
        };
        info!("Relaying offer to {}", peer_id);
        if let Err(e) = self.signaling.relay_offer(peer_id.clone(), offer).await {
            warn!("Failed to relay offer to {}: {}", peer_id, e);
            self.connections
                .fail_peer(&peer_id, format!("offer not relayed: {}", e))
                .await;
        }
    }

    /// The transport to `peer_id` went down. A peer still in the room is
    /// admitted again; while the relay is away the rejoin does that instead.
    pub(super) async fn recover_peer(&mut self, peer_id: PeerId) {
        let member = self
            .signaling
            .room()
            .is_some_and(|room| room.members.contains(&peer_id));
        if !member || !self.signaling.is_connected() {
            return;
        }

        let losses = self.renegotiations.entry(peer_id.clone()).or_insert(0);
        *losses += 1;
        if *losses > self.config.transport.max_renegotiations {
            warn!("Not renegotiating with {} after {} transport losses", peer_id, losses);
            return;
        }
        info!("Transport to {} lost, negotiating again", peer_id);
        self.admit_peer(peer_id).await;
    }

    async fn drop_peer(&mut self, peer_id: &PeerId) {
        self.renegotiations.remove(peer_id);
        self.transfers.forget_peer(peer_id);
        self.connections.remove_peer(peer_id).await;
    }
}
