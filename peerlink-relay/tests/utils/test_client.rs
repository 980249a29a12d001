use anyhow::{Context, Result, anyhow, bail};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use peerlink_core::{PeerId, RoomId, SignalEnvelope, SignalMessage};

use super::relay_helpers::{SIGNAL_TIMEOUT_MS, SILENCE_MS};

/// A raw websocket session against the relay, speaking the JSON protocol.
pub struct TestClient {
    pub peer_id: PeerId,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Opens the socket without consuming anything the relay sends.
    pub async fn connect(addr: SocketAddr, peer_id: &str) -> Result<Self> {
        let url = format!("ws://{}/ws/{}", addr, peer_id);
        let (ws, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        Ok(Self {
            peer_id: PeerId::from(peer_id),
            ws,
        })
    }

    /// Connects and drains the `welcome` and `ice-config` greeting.
    pub async fn connect_ready(addr: SocketAddr, peer_id: &str) -> Result<Self> {
        let mut client = Self::connect(addr, peer_id).await?;
        client
            .expect(|m| matches!(m, SignalMessage::Welcome { .. }))
            .await?;
        client
            .expect(|m| matches!(m, SignalMessage::IceConfig { .. }))
            .await?;
        Ok(client)
    }

    pub async fn send(&mut self, message: SignalMessage) -> Result<()> {
        self.send_envelope(&SignalEnvelope::new(message, 1)).await
    }

    pub async fn send_envelope(&mut self, envelope: &SignalEnvelope) -> Result<()> {
        let json = envelope.to_json()?;
        self.ws
            .send(Message::Text(json.into()))
            .await
            .context("Failed to send frame")?;
        Ok(())
    }

    /// Joins `room` and returns the members reported in `room-joined`.
    pub async fn join(&mut self, room: &str) -> Result<Vec<PeerId>> {
        self.send(SignalMessage::JoinRoom {
            room_id: RoomId::from(room),
        })
        .await?;

        let envelope = self
            .expect(|m| matches!(m, SignalMessage::RoomJoined { .. }))
            .await?;
        match envelope.message {
            SignalMessage::RoomJoined { peers, .. } => Ok(peers),
            other => bail!("unexpected {:?}", other),
        }
    }

    /// Next signal frame, failing after `SIGNAL_TIMEOUT_MS`.
    pub async fn recv(&mut self) -> Result<SignalEnvelope> {
        self.recv_within(SIGNAL_TIMEOUT_MS)
            .await?
            .ok_or_else(|| anyhow!("{} got no signal in time", self.peer_id))
    }

    /// Next frame matching `pred`; anything else in between is an error.
    pub async fn expect(&mut self, pred: impl Fn(&SignalMessage) -> bool) -> Result<SignalEnvelope> {
        let envelope = self.recv().await?;
        if !pred(&envelope.message) {
            bail!("{} got unexpected {:?}", self.peer_id, envelope.message);
        }
        Ok(envelope)
    }

    /// True when nothing arrives for `SILENCE_MS`.
    pub async fn is_silent(&mut self) -> Result<bool> {
        Ok(self.recv_within(SILENCE_MS).await?.is_none())
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await.context("Failed to close socket")
    }

    async fn recv_within(&mut self, timeout_ms: u64) -> Result<Option<SignalEnvelope>> {
        loop {
            let next = tokio::time::timeout(Duration::from_millis(timeout_ms), self.ws.next()).await;
            let frame = match next {
                Err(_) => return Ok(None),
                Ok(None) => bail!("{} socket closed", self.peer_id),
                Ok(Some(frame)) => frame?,
            };

            if let Message::Text(text) = frame {
                let envelope = SignalEnvelope::from_json(&text)?;
                tracing::debug!("[TestClient {}] <- {:?}", self.peer_id, envelope.message);
                return Ok(Some(envelope));
            }
        }
    }
}
