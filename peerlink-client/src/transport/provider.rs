use crate::transport::{SessionId, TransportEvent};
use anyhow::Result;
use async_trait::async_trait;
use peerlink_core::{ChannelData, IceServerConfig, PeerId};
use tokio::sync::mpsc;

/// Creates transport sessions. Production uses [`crate::WebRtcTransport`];
/// tests plug in an in-process loopback.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// Opens a session towards `peer_id`. Everything the session observes is
    /// reported on `events`, tagged with `session_id`.
    async fn create_session(
        &self,
        peer_id: PeerId,
        session_id: SessionId,
        ice_servers: &[IceServerConfig],
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn TransportSession>>;
}

/// One negotiated transport session and its direct channel.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Creates the direct channel on the offering side.
    async fn create_channel(&self, label: &str) -> Result<()>;

    /// Creates an offer and installs it as the local description.
    async fn create_offer(&self) -> Result<String>;

    async fn apply_offer(&self, sdp: String) -> Result<()>;

    /// Creates an answer to an applied offer and installs it locally.
    async fn create_answer(&self) -> Result<String>;

    async fn apply_answer(&self, sdp: String) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: String) -> Result<()>;

    async fn send(&self, data: ChannelData) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
