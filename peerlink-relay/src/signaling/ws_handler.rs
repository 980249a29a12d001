use crate::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use peerlink_core::{PeerId, RoomId, SignalEnvelope, SignalMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(peer_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let peer_id = PeerId::from(peer_id);

    ws.on_upgrade(move |socket| handle_socket(socket, peer_id, state))
}

async fn handle_socket(socket: WebSocket, peer_id: PeerId, state: Arc<AppState>) {
    info!("New WebSocket connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.signaling.add_peer(peer_id.clone(), tx.clone());
    state.signaling.send_signal(
        &peer_id,
        SignalMessage::Welcome {
            peer_id: peer_id.clone(),
        },
    );
    state.signaling.send_signal(
        &peer_id,
        SignalMessage::IceConfig {
            ice_servers: state.signaling.get_ice_servers(),
        },
    );

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let state = state.clone();
        let peer_id = peer_id.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match SignalEnvelope::from_json(&text) {
                        Ok(envelope) => route_signal(&state, &peer_id, envelope),
                        Err(e) => warn!("Invalid SignalMessage from {}: {:?}", peer_id, e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    if state.signaling.remove_peer(&peer_id, &tx) {
        leave_room(&state, &peer_id);
    }
    info!("WebSocket disconnected: {}", peer_id);
}

/// Applies one client frame. Negotiation payloads only travel between
/// members of the same room.
fn route_signal(state: &AppState, peer_id: &PeerId, envelope: SignalEnvelope) {
    let SignalEnvelope {
        message, timestamp, ..
    } = envelope;

    match message {
        SignalMessage::JoinRoom { room_id } => join_room(state, peer_id, room_id),

        SignalMessage::LeaveRoom => leave_room(state, peer_id),

        msg @ (SignalMessage::Offer { .. }
        | SignalMessage::Answer { .. }
        | SignalMessage::IceCandidate { .. }) => {
            let Some(target) = msg.target().cloned() else {
                return;
            };
            if !state.rooms.share_room(peer_id, &target) {
                warn!("Dropping signal from {} to {}: not in the same room", peer_id, target);
                return;
            }
            state
                .signaling
                .forward_signal(peer_id, &target, msg, timestamp);
        }

        other => debug!("Ignoring {:?} from {}", other, peer_id),
    }
}

fn join_room(state: &AppState, peer_id: &PeerId, room_id: RoomId) {
    info!("Peer {} wants to join room '{}'", peer_id, room_id);

    let joined = match state.rooms.join(peer_id, &room_id) {
        Ok(joined) => joined,
        Err(e) => {
            warn!("Join of '{}' by {} rejected: {}", room_id, peer_id, e);
            state.signaling.send_signal(
                peer_id,
                SignalMessage::JoinRejected {
                    room_id,
                    reason: e.to_string(),
                },
            );
            return;
        }
    };

    if let Some(previous) = joined.previous {
        announce_departure(state, peer_id, &previous.remaining);
    }

    state.signaling.send_signal(
        peer_id,
        SignalMessage::RoomJoined {
            room_id,
            peers: joined.existing.clone(),
        },
    );
    for member in &joined.existing {
        state.signaling.send_signal(
            member,
            SignalMessage::PeerJoined {
                peer_id: peer_id.clone(),
            },
        );
    }
}

fn leave_room(state: &AppState, peer_id: &PeerId) {
    let Some(departure) = state.rooms.leave(peer_id) else {
        return;
    };
    info!("Peer {} left room '{}'", peer_id, departure.room_id);
    announce_departure(state, peer_id, &departure.remaining);
}

fn announce_departure(state: &AppState, peer_id: &PeerId, remaining: &[PeerId]) {
    for member in remaining {
        state.signaling.send_signal(
            member,
            SignalMessage::PeerLeft {
                peer_id: peer_id.clone(),
            },
        );
    }
}
