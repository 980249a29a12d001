use crate::bus::{EventBus, SessionEvent};
use crate::config::SignalingConfig;
use crate::error::{Result, SessionError};
use crate::signaling::{RelayEvent, RelayLink};
use peerlink_core::utils::now_millis;
use peerlink_core::{IceServerConfig, PeerId, RoomId, SignalEnvelope, SignalMessage};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
    Reconnecting,
    /// Reconnect attempts are exhausted; only `connect` leaves this state.
    Failed,
}

/// The room this session is in, as last reported by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMembership {
    pub room_id: RoomId,
    /// Other members. The local session is never listed.
    pub members: BTreeSet<PeerId>,
}

/// Relay traffic the session loop has to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingInbound {
    IceConfig(Vec<IceServerConfig>),
    RoomJoined {
        room_id: RoomId,
        members: Vec<PeerId>,
        /// Members of the previous membership that are no longer present
        /// (after a rejoin).
        departed: Vec<PeerId>,
    },
    JoinRejected {
        room_id: RoomId,
        reason: String,
    },
    PeerJoined(PeerId),
    PeerLeft(PeerId),
    Offer {
        from: PeerId,
        sdp: String,
    },
    Answer {
        from: PeerId,
        sdp: String,
    },
    Candidate {
        from: PeerId,
        candidate: String,
    },
}

/// Keeps the relay link, the room membership and the reconnect schedule.
pub struct SignalingHandler {
    local_id: PeerId,
    link: Box<dyn RelayLink>,
    config: SignalingConfig,
    bus: EventBus,
    endpoint: Option<String>,
    state: LinkState,
    room: Option<RoomMembership>,
    joining: Option<RoomId>,
    rejoin: Option<RoomId>,
    reconnect_attempts: u32,
    reconnect_at: Option<Instant>,
}

impl SignalingHandler {
    pub fn new(
        local_id: PeerId,
        link: Box<dyn RelayLink>,
        config: SignalingConfig,
        bus: EventBus,
    ) -> Self {
        Self {
            local_id,
            link,
            config,
            bus,
            endpoint: None,
            state: LinkState::Disconnected,
            room: None,
            joining: None,
            rejoin: None,
            reconnect_attempts: 0,
            reconnect_at: None,
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn room(&self) -> Option<&RoomMembership> {
        self.room.as_ref()
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Opens the relay link. Frames arrive on the returned receiver.
    pub async fn connect(&mut self, endpoint: &str) -> Result<mpsc::Receiver<RelayEvent>> {
        self.endpoint = Some(endpoint.trim_end_matches('/').to_owned());
        self.reconnect_attempts = 0;
        self.reconnect_at = None;

        match self.open_link().await {
            Ok(rx) => {
                self.state = LinkState::Connected;
                info!("Signaling connected as {}", self.local_id);
                self.bus.publish(SessionEvent::SignalingConnected {
                    local_id: self.local_id.clone(),
                });
                Ok(rx)
            }
            Err(e) => {
                self.state = LinkState::Disconnected;
                error!("Signaling connect failed: {}", e);
                Err(e)
            }
        }
    }

    async fn open_link(&mut self) -> Result<mpsc::Receiver<RelayEvent>> {
        let Some(endpoint) = &self.endpoint else {
            return Err(SessionError::NotConnected);
        };
        let url = format!("{}/ws/{}", endpoint, self.local_id);
        let (tx, rx) = mpsc::channel(256);

        match tokio::time::timeout(self.config.connect_timeout, self.link.connect(&url, tx)).await
        {
            Ok(Ok(())) => Ok(rx),
            Ok(Err(e)) => Err(SessionError::SignalingUnreachable(format!("{:#}", e))),
            Err(_) => Err(SessionError::SignalingUnreachable(format!(
                "no answer from {} within {:?}",
                url, self.config.connect_timeout
            ))),
        }
    }

    /// Sends a join intent. Completion is reported by `room-joined` or
    /// `join-rejected` from the relay.
    pub async fn join_room(&mut self, room_id: RoomId) -> Result<()> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        info!("Joining room '{}'", room_id);
        self.send(SignalMessage::JoinRoom {
            room_id: room_id.clone(),
        })
        .await?;
        self.joining = Some(room_id);
        Ok(())
    }

    /// Leaves the current room. Returns the room left, or `None` when there
    /// was nothing to leave.
    pub async fn leave_room(&mut self) -> Option<RoomId> {
        self.rejoin = None;
        let pending = self.joining.take();
        let Some(room) = self.room.take() else {
            if pending.is_some() && self.is_connected() {
                let _ = self.send(SignalMessage::LeaveRoom).await;
            }
            return None;
        };

        if self.is_connected() {
            if let Err(e) = self.send(SignalMessage::LeaveRoom).await {
                warn!("Leave notice for '{}' not sent: {}", room.room_id, e);
            }
        }

        info!("Left room '{}'", room.room_id);
        self.bus.publish(SessionEvent::RoomLeft {
            room_id: room.room_id.clone(),
        });
        Some(room.room_id)
    }

    pub async fn relay_offer(&self, target: PeerId, offer: String) -> Result<()> {
        self.send(SignalMessage::Offer { target, offer }).await
    }

    pub async fn relay_answer(&self, target: PeerId, answer: String) -> Result<()> {
        self.send(SignalMessage::Answer { target, answer }).await
    }

    pub async fn relay_ice_candidate(&self, target: PeerId, candidate: String) -> Result<()> {
        self.send(SignalMessage::IceCandidate { target, candidate })
            .await
    }

    async fn send(&self, message: SignalMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let envelope = SignalEnvelope::new(message, now_millis());
        let json = envelope.to_json().map_err(|e| {
            error!("Failed to serialize signal message: {}", e);
            SessionError::NotConnected
        })?;

        self.link.send(json).await.map_err(|e| {
            warn!("Relay send failed: {:#}", e);
            SessionError::NotConnected
        })
    }

    /// Applies one relay frame to the membership state and publishes the
    /// resulting events.
    pub fn handle_frame(&mut self, text: &str) -> Option<SignalingInbound> {
        let envelope = match SignalEnvelope::from_json(text) {
            Ok(env) => env,
            Err(e) => {
                warn!("Invalid signal frame: {}. Text: {}", e, text);
                return None;
            }
        };
        let sender = envelope.sender;

        match envelope.message {
            SignalMessage::Welcome { peer_id } => {
                if peer_id != self.local_id {
                    warn!("Relay welcomed {} but this session is {}", peer_id, self.local_id);
                }
                debug!("Received welcome from relay");
                None
            }

            SignalMessage::IceConfig { ice_servers } => {
                info!("Received ICE config: {} servers", ice_servers.len());
                Some(SignalingInbound::IceConfig(ice_servers))
            }

            SignalMessage::RoomJoined { room_id, peers } => self.on_room_joined(room_id, peers),

            SignalMessage::JoinRejected { room_id, reason } => {
                warn!("Relay rejected join of '{}': {}", room_id, reason);
                self.joining = None;
                self.bus.publish(SessionEvent::RoomJoinFailed {
                    room_id: room_id.clone(),
                    reason: reason.clone(),
                });
                Some(SignalingInbound::JoinRejected { room_id, reason })
            }

            SignalMessage::PeerJoined { peer_id } => {
                if peer_id == self.local_id {
                    return None;
                }
                let room = self.room.as_mut()?;
                if !room.members.insert(peer_id.clone()) {
                    return None;
                }
                info!("Peer {} joined '{}'", peer_id, room.room_id);
                self.bus.publish(SessionEvent::PeerJoined {
                    peer_id: peer_id.clone(),
                });
                Some(SignalingInbound::PeerJoined(peer_id))
            }

            SignalMessage::PeerLeft { peer_id } => {
                let room = self.room.as_mut()?;
                if !room.members.remove(&peer_id) {
                    return None;
                }
                info!("Peer {} left '{}'", peer_id, room.room_id);
                self.bus.publish(SessionEvent::PeerLeft {
                    peer_id: peer_id.clone(),
                });
                Some(SignalingInbound::PeerLeft(peer_id))
            }

            SignalMessage::Offer { offer, .. } => {
                let from = Self::require_sender(sender, "offer")?;
                Some(SignalingInbound::Offer { from, sdp: offer })
            }

            SignalMessage::Answer { answer, .. } => {
                let from = Self::require_sender(sender, "answer")?;
                Some(SignalingInbound::Answer { from, sdp: answer })
            }

            SignalMessage::IceCandidate { candidate, .. } => {
                let from = Self::require_sender(sender, "ice-candidate")?;
                Some(SignalingInbound::Candidate { from, candidate })
            }

            SignalMessage::JoinRoom { .. } | SignalMessage::LeaveRoom => {
                debug!("Ignoring client-bound frame sent by relay");
                None
            }
        }
    }

    fn require_sender(sender: Option<PeerId>, kind: &str) -> Option<PeerId> {
        if sender.is_none() {
            warn!("Dropping {} without sender", kind);
        }
        sender
    }

    fn on_room_joined(&mut self, room_id: RoomId, peers: Vec<PeerId>) -> Option<SignalingInbound> {
        self.joining = None;
        self.rejoin = None;

        let members: BTreeSet<PeerId> = peers
            .into_iter()
            .filter(|p| *p != self.local_id)
            .collect();

        let departed: Vec<PeerId> = match self.room.take() {
            Some(previous) if previous.room_id == room_id => {
                previous.members.difference(&members).cloned().collect()
            }
            Some(previous) => {
                self.bus.publish(SessionEvent::RoomLeft {
                    room_id: previous.room_id,
                });
                Vec::new()
            }
            None => Vec::new(),
        };

        let existing: Vec<PeerId> = members.iter().cloned().collect();
        info!("Joined room '{}' with {} members", room_id, existing.len());

        self.room = Some(RoomMembership {
            room_id: room_id.clone(),
            members,
        });

        for peer_id in &departed {
            self.bus.publish(SessionEvent::PeerLeft {
                peer_id: peer_id.clone(),
            });
        }
        self.bus.publish(SessionEvent::RoomJoined {
            room_id: room_id.clone(),
            existing_members: existing.clone(),
        });
        for peer_id in &existing {
            self.bus.publish(SessionEvent::PeerJoined {
                peer_id: peer_id.clone(),
            });
        }

        Some(SignalingInbound::RoomJoined {
            room_id,
            members: existing,
            departed,
        })
    }

    /// The relay socket dropped. Returns the delay before the next attempt,
    /// if one is scheduled.
    pub fn on_link_lost(&mut self) -> Option<Duration> {
        if self.state != LinkState::Connected {
            return None;
        }
        warn!("Relay link lost");
        self.bus.publish(SessionEvent::SignalingDisconnected);

        self.rejoin = self
            .room
            .as_ref()
            .map(|r| r.room_id.clone())
            .or_else(|| self.joining.take());

        if !self.config.auto_reconnect {
            self.state = LinkState::Disconnected;
            return None;
        }
        self.schedule_reconnect()
    }

    fn schedule_reconnect(&mut self) -> Option<Duration> {
        self.reconnect_attempts += 1;

        if self.reconnect_attempts > self.config.max_reconnect_attempts {
            error!(
                "Giving up on relay after {} attempts",
                self.config.max_reconnect_attempts
            );
            self.state = LinkState::Failed;
            self.reconnect_at = None;
            self.rejoin = None;
            self.bus.publish(SessionEvent::ReconnectFailed {
                attempts: self.config.max_reconnect_attempts,
            });
            return None;
        }

        let delay = self.config.reconnect_base_delay * self.reconnect_attempts;
        info!(
            "Reconnecting to relay in {:?} (attempt {})",
            delay, self.reconnect_attempts
        );
        self.state = LinkState::Reconnecting;
        self.reconnect_at = Some(Instant::now() + delay);
        self.bus.publish(SessionEvent::Reconnecting {
            attempt: self.reconnect_attempts,
            delay,
        });
        Some(delay)
    }

    /// Runs one scheduled reconnect attempt. On success the previous room is
    /// joined again; on failure the next attempt is scheduled.
    pub async fn try_reconnect(&mut self) -> Option<mpsc::Receiver<RelayEvent>> {
        self.reconnect_at = None;
        if self.state != LinkState::Reconnecting {
            return None;
        }

        match self.open_link().await {
            Ok(rx) => {
                info!("Relay link restored after {} attempts", self.reconnect_attempts);
                self.state = LinkState::Connected;
                self.reconnect_attempts = 0;
                self.bus.publish(SessionEvent::SignalingConnected {
                    local_id: self.local_id.clone(),
                });

                if let Some(room_id) = self.rejoin.take() {
                    if let Err(e) = self.join_room(room_id).await {
                        warn!("Rejoin after reconnect failed: {}", e);
                    }
                }
                Some(rx)
            }
            Err(e) => {
                warn!("Reconnect attempt {} failed: {}", self.reconnect_attempts, e);
                self.schedule_reconnect();
                None
            }
        }
    }

    /// Leaves the room, cancels any pending reconnect and closes the link.
    pub async fn disconnect(&mut self) {
        self.leave_room().await;

        let was_up = self.state != LinkState::Disconnected;
        self.state = LinkState::Disconnected;
        self.reconnect_at = None;
        self.reconnect_attempts = 0;
        self.link.close().await;

        if was_up {
            self.bus.publish(SessionEvent::SignalingDisconnected);
        }
    }
}
