use axum::extract::ws::Message;
use dashmap::DashMap;
use peerlink_core::utils::now_millis;
use peerlink_core::{IceServerConfig, PeerId, SignalEnvelope, SignalMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, warn};

struct SignalingInner {
    peers: DashMap<PeerId, mpsc::UnboundedSender<Message>>,
    ice_servers: Vec<IceServerConfig>,
}

/// Outbound socket queues of every connected session.
#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
}

impl SignalingService {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self {
            inner: Arc::new(SignalingInner {
                peers: DashMap::new(),
                ice_servers,
            }),
        }
    }

    pub fn get_ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.ice_servers.clone()
    }

    /// Registers the socket queue of `peer_id`, replacing an older one.
    pub fn add_peer(&self, peer_id: PeerId, tx: mpsc::UnboundedSender<Message>) {
        if self.inner.peers.insert(peer_id.clone(), tx).is_some() {
            warn!("Peer {} reconnected, dropping its previous socket", peer_id);
        }
    }

    /// Unregisters `peer_id` if `tx` is still its current queue. Returns
    /// whether it was.
    pub fn remove_peer(&self, peer_id: &PeerId, tx: &mpsc::UnboundedSender<Message>) -> bool {
        self.inner
            .peers
            .remove_if(peer_id, |_, current| current.same_channel(tx))
            .is_some()
    }

    pub fn is_online(&self, peer_id: &PeerId) -> bool {
        self.inner.peers.contains_key(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.len()
    }

    /// Sends a relay-originated signal.
    pub fn send_signal(&self, peer_id: &PeerId, msg: SignalMessage) -> bool {
        self.send_envelope(peer_id, &SignalEnvelope::new(msg, now_millis()))
    }

    /// Forwards `msg` from `sender`. The sender field is always set here,
    /// never taken from the client.
    pub fn forward_signal(&self, sender: &PeerId, target: &PeerId, msg: SignalMessage, timestamp: u64) -> bool {
        let timestamp = if timestamp == 0 { now_millis() } else { timestamp };
        let envelope = SignalEnvelope::from_sender(msg, sender.clone(), timestamp);
        self.send_envelope(target, &envelope)
    }

    fn send_envelope(&self, peer_id: &PeerId, envelope: &SignalEnvelope) -> bool {
        let Some(peer) = self.inner.peers.get(peer_id) else {
            warn!("Attempted to send signal to disconnected user {}", peer_id);
            return false;
        };

        match envelope.to_json() {
            Ok(json) => {
                if let Err(e) = peer.send(Message::Text(json.into())) {
                    error!("Failed to send WS message to {}: {:?}", peer_id, e);
                    return false;
                }
                true
            }
            Err(e) => {
                error!("Failed to serialize signal message: {}", e);
                false
            }
        }
    }
}
