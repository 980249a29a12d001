use anyhow::{Context, Result, anyhow};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use peerlink_client::{ClientConfig, RelayLink, SessionEvent, SessionHandle, WebSocketRelayLink};
use peerlink_core::PeerId;
use peerlink_relay::{AppState, RelayConfig};

use super::loopback::LoopbackNetwork;
use super::recording_sink::RecordingSink;

/// Timeout for one expected session event (ms).
pub const EVENT_TIMEOUT_MS: u64 = 5000;

/// Runs a relay on an ephemeral local port and returns its websocket base URL.
pub async fn spawn_relay() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind relay listener")?;
    let addr: SocketAddr = listener.local_addr()?;
    let state = Arc::new(AppState::new(&RelayConfig::default()));

    tokio::spawn(async move {
        if let Err(e) = peerlink_relay::serve(listener, state).await {
            tracing::error!("[TestPeer] relay stopped: {:?}", e);
        }
    });

    Ok(format!("ws://{}", addr))
}

/// A session wired to the loopback network and a real relay link, with its
/// full event stream and a recording sink attached before it connects.
pub struct TestPeer {
    pub handle: SessionHandle,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub sink: Arc<RecordingSink>,
}

impl TestPeer {
    pub fn spawn(network: &LoopbackNetwork, id: &str, config: ClientConfig) -> Self {
        Self::spawn_with_link(network, id, config, Box::new(WebSocketRelayLink::new()))
    }

    pub fn spawn_with_link(
        network: &LoopbackNetwork,
        id: &str,
        config: ClientConfig,
        link: Box<dyn RelayLink>,
    ) -> Self {
        let handle = SessionHandle::spawn_with(PeerId::from(id), config, network.provider(id), link);
        let events = handle.subscribe();
        let sink = Arc::new(RecordingSink::new());
        handle.attach_sink(sink.clone());

        Self {
            handle,
            events,
            sink,
        }
    }

    /// Spawns, connects to `relay` and joins `room`.
    pub async fn join(
        network: &LoopbackNetwork,
        relay: &str,
        id: &str,
        room: &str,
        config: ClientConfig,
    ) -> Result<Self> {
        let peer = Self::spawn(network, id, config);
        peer.handle
            .initialize(relay)
            .await
            .with_context(|| format!("{} failed to initialize", id))?;
        peer.handle
            .join_room(room)
            .await
            .with_context(|| format!("{} failed to join {}", id, room))?;
        Ok(peer)
    }

    pub fn id(&self) -> PeerId {
        self.handle.local_id().clone()
    }

    /// Next event matching `pred`, skipping the others.
    pub async fn wait_for(
        &mut self,
        what: &str,
        pred: impl Fn(&SessionEvent) -> bool,
    ) -> Result<SessionEvent> {
        let events = &mut self.events;
        let found = tokio::time::timeout(Duration::from_millis(EVENT_TIMEOUT_MS), async {
            while let Some(event) = events.recv().await {
                if pred(&event) {
                    return Some(event);
                }
            }
            None
        })
        .await
        .map_err(|_| anyhow!("{} timed out waiting for {}", self.handle.local_id(), what))?;

        found.ok_or_else(|| anyhow!("event bus closed while waiting for {}", what))
    }

    /// Waits until the direct channel to `peer` is open.
    pub async fn wait_for_channel(&mut self, peer: &PeerId) -> Result<()> {
        let peer = peer.clone();
        self.wait_for("channel-open", move |e| {
            matches!(e, SessionEvent::ChannelOpen { peer_id } if *peer_id == peer)
        })
        .await?;
        Ok(())
    }
}

/// Two sessions in one room with an open channel between them.
pub async fn connected_pair(
    network: &LoopbackNetwork,
    relay: &str,
    config: ClientConfig,
) -> Result<(TestPeer, TestPeer)> {
    let mut alice = TestPeer::join(network, relay, "alice", "R1", config.clone()).await?;
    let mut bob = TestPeer::join(network, relay, "bob", "R1", config).await?;

    alice.wait_for_channel(&bob.id()).await?;
    bob.wait_for_channel(&alice.id()).await?;
    Ok((alice, bob))
}
