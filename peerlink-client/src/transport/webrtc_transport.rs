use crate::transport::{
    SessionId, TransportEvent, TransportEventKind, TransportProvider, TransportSession,
    TransportState,
};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use peerlink_core::{ChannelData, IceServerConfig, PeerId};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Transport provider backed by webrtc-rs peer connections.
#[derive(Debug, Clone, Default)]
pub struct WebRtcTransport;

impl WebRtcTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportProvider for WebRtcTransport {
    async fn create_session(
        &self,
        peer_id: PeerId,
        session_id: SessionId,
        ice_servers: &[IceServerConfig],
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn TransportSession>> {
        let session = WebRtcSession::new(peer_id, session_id, ice_servers, events).await?;
        Ok(Box::new(session))
    }
}

pub struct WebRtcSession {
    peer_id: PeerId,
    session_id: SessionId,
    peer_connection: Arc<RTCPeerConnection>,
    data_channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    events: mpsc::Sender<TransportEvent>,
}

impl WebRtcSession {
    /// Builds the peer connection and hooks its callbacks into `events`.
    pub async fn new(
        peer_id: PeerId,
        session_id: SessionId,
        ice_servers: &[IceServerConfig],
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Self> {
        // Codecs are registered even though only data channels are used.
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .context("Failed to create peer connection")?,
        );
        let data_channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>> = Arc::new(Mutex::new(None));

        let state_tx = events.clone();
        let pid_state = peer_id.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let pid = pid_state.clone();

                Box::pin(async move {
                    info!("Peer connection state changed for {}: {:?}", pid, s);
                    let state = match s {
                        RTCPeerConnectionState::New => TransportState::New,
                        RTCPeerConnectionState::Connecting => TransportState::Connecting,
                        RTCPeerConnectionState::Connected => TransportState::Connected,
                        RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
                        RTCPeerConnectionState::Failed => TransportState::Failed,
                        RTCPeerConnectionState::Closed => TransportState::Closed,
                        _ => return,
                    };
                    let event = TransportEvent::new(
                        pid,
                        session_id,
                        TransportEventKind::StateChanged(state),
                    );
                    let _ = tx.send(event).await;
                })
            },
        ));

        // Trickle ICE: local candidates go out through signaling.
        let ice_tx = events.clone();
        let pid_ice = peer_id.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let pid = pid_ice.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(json_candidate) = candidate.to_json() else {
                    return;
                };
                let Ok(str_candidate) = serde_json::to_string(&json_candidate) else {
                    return;
                };
                let event = TransportEvent::new(
                    pid,
                    session_id,
                    TransportEventKind::CandidateGenerated(str_candidate),
                );
                let _ = tx.send(event).await;
            })
        }));

        // The answering side receives its channel from the offerer.
        let dc_tx = events.clone();
        let pid_dc = peer_id.clone();
        let dc_slot = data_channel.clone();
        peer_connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let tx = dc_tx.clone();
            let pid = pid_dc.clone();
            let slot = dc_slot.clone();

            Box::pin(async move {
                debug!("DataChannel '{}' received from {}", dc.label(), pid);
                wire_channel(&dc, pid, session_id, tx);
                *slot.lock().await = Some(dc);
            })
        }));

        Ok(Self {
            peer_id,
            session_id,
            peer_connection,
            data_channel,
            events,
        })
    }

    async fn open_channel(&self) -> Result<Arc<RTCDataChannel>> {
        let guard = self.data_channel.lock().await;
        let Some(dc) = guard.as_ref() else {
            bail!("no data channel for {}", self.peer_id);
        };
        if dc.ready_state() != RTCDataChannelState::Open {
            bail!("data channel to {} is not open", self.peer_id);
        }
        Ok(dc.clone())
    }
}

/// Forwards open, close and message callbacks of `dc` as transport events.
fn wire_channel(
    dc: &Arc<RTCDataChannel>,
    peer_id: PeerId,
    session_id: SessionId,
    tx: mpsc::Sender<TransportEvent>,
) {
    let label = dc.label().to_owned();
    let tx_open = tx.clone();
    let pid_open = peer_id.clone();
    dc.on_open(Box::new(move || {
        let tx = tx_open.clone();
        let pid = pid_open.clone();
        let label = label.clone();

        Box::pin(async move {
            info!("DataChannel open and ready for {}", pid);
            let event =
                TransportEvent::new(pid, session_id, TransportEventKind::ChannelOpen(label));
            let _ = tx.send(event).await;
        })
    }));

    let tx_close = tx.clone();
    let pid_close = peer_id.clone();
    dc.on_close(Box::new(move || {
        let tx = tx_close.clone();
        let pid = pid_close.clone();

        Box::pin(async move {
            debug!("DataChannel closed for {}", pid);
            let event = TransportEvent::new(pid, session_id, TransportEventKind::ChannelClosed);
            let _ = tx.send(event).await;
        })
    }));

    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = tx.clone();
        let pid = peer_id.clone();

        Box::pin(async move {
            let data = if msg.is_string {
                match String::from_utf8(msg.data.to_vec()) {
                    Ok(text) => ChannelData::Text(text),
                    Err(e) => {
                        warn!("Dropping non UTF-8 text frame from {}: {}", pid, e);
                        return;
                    }
                }
            } else {
                ChannelData::Binary(Bytes::from(msg.data.to_vec()))
            };
            let event = TransportEvent::new(pid, session_id, TransportEventKind::Data(data));
            let _ = tx.send(event).await;
        })
    }));
}

#[async_trait]
impl TransportSession for WebRtcSession {
    async fn create_channel(&self, label: &str) -> Result<()> {
        let dc = self
            .peer_connection
            .create_data_channel(label, None)
            .await
            .context("Failed to create data channel")?;

        wire_channel(&dc, self.peer_id.clone(), self.session_id, self.events.clone());
        *self.data_channel.lock().await = Some(dc);
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .context("Failed to create offer")?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await
            .context("Failed to set local description")?;
        Ok(offer.sdp)
    }

    async fn apply_offer(&self, sdp: String) -> Result<()> {
        let desc = RTCSessionDescription::offer(sdp)?;
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    async fn apply_answer(&self, sdp: String) -> Result<()> {
        let desc = RTCSessionDescription::answer(sdp)?;
        self.peer_connection
            .set_remote_description(desc)
            .await
            .context("Failed to set remote description")?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: String) -> Result<()> {
        let candidate: RTCIceCandidateInit =
            serde_json::from_str(&candidate).context("Failed to parse ICE candidate JSON")?;
        self.peer_connection.add_ice_candidate(candidate).await?;
        Ok(())
    }

    async fn send(&self, data: ChannelData) -> Result<()> {
        let dc = self.open_channel().await?;
        match data {
            ChannelData::Text(text) => dc.send_text(text).await?,
            ChannelData::Binary(bytes) => dc.send(&bytes).await?,
        };
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}
