use anyhow::{Result, bail};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use peerlink_client::{
    SessionId, TransportEvent, TransportEventKind, TransportProvider, TransportSession,
    TransportState,
};
use peerlink_core::{ChannelData, IceServerConfig, PeerId};

/// Label the loopback reports for every opened channel.
pub const LOOPBACK_CHANNEL: &str = "data";

#[derive(Clone)]
struct Endpoint {
    session_id: SessionId,
    events: mpsc::Sender<TransportEvent>,
    /// Session on the other end once connected.
    paired: Option<SessionId>,
}

/// In-process stand-in for the network between sessions of one test.
///
/// Sessions are keyed by `(owner, remote)`. Applying an answer connects
/// both ends at once and opens their channels. Closing a connected session
/// reports `Closed` to the session paired with it.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    endpoints: Arc<DashMap<(PeerId, PeerId), Endpoint>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(&self, local: &str) -> Arc<LoopbackProvider> {
        Arc::new(LoopbackProvider {
            network: self.clone(),
            local: PeerId::from(local),
        })
    }

    fn session_of(&self, owner: &PeerId, remote: &PeerId) -> Option<SessionId> {
        self.endpoints
            .get(&(owner.clone(), remote.clone()))
            .map(|e| e.session_id)
    }

    fn pair(&self, a: &PeerId, b: &PeerId) {
        let (Some(a_session), Some(b_session)) = (self.session_of(a, b), self.session_of(b, a))
        else {
            return;
        };
        if let Some(mut endpoint) = self.endpoints.get_mut(&(a.clone(), b.clone())) {
            endpoint.paired = Some(b_session);
        }
        if let Some(mut endpoint) = self.endpoints.get_mut(&(b.clone(), a.clone())) {
            endpoint.paired = Some(a_session);
        }
    }

    /// Tells `owner`'s session `session_id` towards `remote` that the other
    /// end is gone. Newer sessions are left alone.
    async fn hang_up(&self, owner: &PeerId, remote: &PeerId, session_id: SessionId) {
        let endpoint = self
            .endpoints
            .get(&(owner.clone(), remote.clone()))
            .map(|e| e.value().clone())
            .filter(|e| e.session_id == session_id);
        let Some(endpoint) = endpoint else {
            return;
        };

        let _ = endpoint
            .events
            .send(TransportEvent::new(
                remote.clone(),
                session_id,
                TransportEventKind::StateChanged(TransportState::Closed),
            ))
            .await;
    }

    /// Delivers `kind` to the session `owner` holds towards `remote`.
    async fn emit(&self, owner: &PeerId, remote: &PeerId, kind: TransportEventKind) -> bool {
        let endpoint = self
            .endpoints
            .get(&(owner.clone(), remote.clone()))
            .map(|e| e.value().clone());
        let Some(endpoint) = endpoint else {
            return false;
        };

        endpoint
            .events
            .send(TransportEvent::new(remote.clone(), endpoint.session_id, kind))
            .await
            .is_ok()
    }
}

pub struct LoopbackProvider {
    network: LoopbackNetwork,
    local: PeerId,
}

#[async_trait]
impl TransportProvider for LoopbackProvider {
    async fn create_session(
        &self,
        peer_id: PeerId,
        session_id: SessionId,
        _ice_servers: &[IceServerConfig],
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn TransportSession>> {
        self.network.endpoints.insert(
            (self.local.clone(), peer_id.clone()),
            Endpoint {
                session_id,
                events,
                paired: None,
            },
        );

        Ok(Box::new(LoopbackSession {
            network: self.network.clone(),
            local: self.local.clone(),
            remote: peer_id,
            session_id,
        }))
    }
}

struct LoopbackSession {
    network: LoopbackNetwork,
    local: PeerId,
    remote: PeerId,
    session_id: SessionId,
}

#[async_trait]
impl TransportSession for LoopbackSession {
    async fn create_channel(&self, _label: &str) -> Result<()> {
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        Ok(format!("offer:{}", self.local))
    }

    async fn apply_offer(&self, _sdp: String) -> Result<()> {
        Ok(())
    }

    async fn create_answer(&self) -> Result<String> {
        Ok(format!("answer:{}", self.local))
    }

    async fn apply_answer(&self, _sdp: String) -> Result<()> {
        self.network.pair(&self.local, &self.remote);
        for (owner, remote) in [(&self.local, &self.remote), (&self.remote, &self.local)] {
            self.network
                .emit(owner, remote, TransportEventKind::StateChanged(TransportState::Connected))
                .await;
            self.network
                .emit(owner, remote, TransportEventKind::ChannelOpen(LOOPBACK_CHANNEL.to_owned()))
                .await;
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, _candidate: String) -> Result<()> {
        Ok(())
    }

    async fn send(&self, data: ChannelData) -> Result<()> {
        if !self
            .network
            .emit(&self.remote, &self.local, TransportEventKind::Data(data))
            .await
        {
            bail!("{} has no session with {}", self.remote, self.local);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let removed = self
            .network
            .endpoints
            .remove_if(&(self.local.clone(), self.remote.clone()), |_, e| {
                e.session_id == self.session_id
            });
        if let Some((_, Endpoint {
            paired: Some(paired),
            ..
        })) = removed
        {
            self.network.hang_up(&self.remote, &self.local, paired).await;
        }
        Ok(())
    }
}
