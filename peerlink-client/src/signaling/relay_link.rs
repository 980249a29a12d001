use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// What the relay socket reports to the session loop.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// One text frame from the relay.
    Frame(String),
    /// The socket is gone; no more frames follow on this channel.
    Closed,
}

/// A persistent socket to the relay service.
#[async_trait]
pub trait RelayLink: Send + Sync {
    /// Opens the socket. Inbound frames, then a final [`RelayEvent::Closed`],
    /// are pushed into `inbound`.
    async fn connect(&mut self, url: &str, inbound: mpsc::Sender<RelayEvent>) -> Result<()>;

    async fn send(&self, text: String) -> Result<()>;

    /// Closes the socket without reporting [`RelayEvent::Closed`].
    async fn close(&mut self);
}
