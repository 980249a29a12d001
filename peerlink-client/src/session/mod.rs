use crate::bus::{EventBus, SessionEvent};
use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::delivery::DeliveryTracker;
use crate::error::{Result, SessionError};
use crate::signaling::{RelayEvent, RelayLink, SignalingHandler};
use crate::transfer::TransferEngine;
use crate::transport::{TransportEvent, TransportProvider};
use peerlink_core::{PeerId, RoomId};
use std::collections::HashMap;
use std::future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

mod command;
mod handle;
mod handle_command_impl;
mod handle_signal_impl;
mod handle_transport_impl;

pub use command::*;
pub use handle::*;

struct PendingJoin {
    room_id: RoomId,
    deadline: Instant,
    reply: oneshot::Sender<Result<Vec<PeerId>>>,
}

/// The session task. Every relay frame, transport event, timer and caller
/// command is handled here one at a time, so the components need no locks.
pub struct Session {
    local_id: PeerId,
    config: ClientConfig,
    bus: EventBus,
    signaling: SignalingHandler,
    connections: ConnectionManager,
    delivery: DeliveryTracker,
    transfers: TransferEngine,
    command_rx: mpsc::Receiver<SessionCommand>,
    relay_rx: Option<mpsc::Receiver<RelayEvent>>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    retry_sweep: Option<Interval>,
    pending_join: Option<PendingJoin>,
    /// Transport losses per room member since its channel last opened.
    renegotiations: HashMap<PeerId, u32>,
}

impl Session {
    pub fn new(
        local_id: PeerId,
        config: ClientConfig,
        bus: EventBus,
        provider: Arc<dyn TransportProvider>,
        link: Box<dyn RelayLink>,
        command_rx: mpsc::Receiver<SessionCommand>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(256);

        let signaling = SignalingHandler::new(
            local_id.clone(),
            link,
            config.signaling.clone(),
            bus.clone(),
        );
        let connections = ConnectionManager::new(
            local_id.clone(),
            provider,
            config.transport.clone(),
            bus.clone(),
            transport_tx,
        );
        let delivery = DeliveryTracker::new(local_id.clone(), config.delivery.clone(), bus.clone());
        let transfers = TransferEngine::new(local_id.clone(), config.transfer.clone(), bus.clone());

        Self {
            local_id,
            config,
            bus,
            signaling,
            connections,
            delivery,
            transfers,
            command_rx,
            relay_rx: None,
            transport_rx,
            retry_sweep: None,
            pending_join: None,
            renegotiations: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        info!("Session {} started", self.local_id);

        loop {
            let reconnect_at = self.signaling.reconnect_deadline();
            let join_deadline = self.pending_join.as_ref().map(|p| p.deadline);
            let pump = self.transfers.has_outbound_work();

            tokio::select! {
                biased;

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("All handles dropped. Shutting down session.");
                            break;
                        }
                    }
                }

                evt = recv_opt(&mut self.relay_rx) => self.handle_relay_event(evt).await,

                evt = self.transport_rx.recv() => {
                    match evt {
                        Some(e) => self.handle_transport_event(e).await,
                        None => {
                            warn!("Transport channel closed unexpectedly");
                            break;
                        }
                    }
                }

                _ = sleep_opt(reconnect_at) => self.reconnect().await,

                _ = sleep_opt(join_deadline) => self.expire_join(),

                _ = tick_opt(&mut self.retry_sweep) => self.delivery.sweep(&self.connections).await,

                _ = future::ready(()), if pump => {
                    self.transfers
                        .pump(&self.connections, self.config.transfer.chunks_per_tick)
                        .await;
                }
            }
        }

        self.shutdown().await;
        info!("Session {} finished", self.local_id);
    }

    fn start_retry_sweep(&mut self) {
        let mut interval = tokio::time::interval(self.config.delivery.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.retry_sweep = Some(interval);
    }

    fn expire_join(&mut self) {
        let Some(pending) = self.pending_join.take() else {
            return;
        };
        let reason = format!(
            "no confirmation within {:?}",
            self.config.signaling.join_timeout
        );
        warn!("Join of '{}' timed out", pending.room_id);
        self.bus.publish(SessionEvent::RoomJoinFailed {
            room_id: pending.room_id.clone(),
            reason: reason.clone(),
        });
        let _ = pending.reply.send(Err(SessionError::RoomJoinFailed {
            room_id: pending.room_id,
            reason,
        }));
    }

    fn settle_join(&mut self, room_id: &RoomId, outcome: Result<Vec<PeerId>>) {
        let Some(pending) = self.pending_join.take_if(|p| &p.room_id == room_id) else {
            return;
        };
        let _ = pending.reply.send(outcome);
    }

    fn abandon_join(&mut self) {
        let Some(pending) = self.pending_join.take() else {
            return;
        };
        let _ = pending.reply.send(Err(SessionError::RoomJoinFailed {
            room_id: pending.room_id,
            reason: "join abandoned".to_owned(),
        }));
    }

    /// Leaves the room: transfers are cancelled, then sessions closed, then
    /// the relay is told.
    async fn leave_room(&mut self) -> Option<RoomId> {
        self.abandon_join();
        self.renegotiations.clear();
        self.transfers.cancel_all(&self.connections).await;
        self.connections.close_all().await;
        self.signaling.leave_room().await
    }

    async fn shutdown(&mut self) {
        self.abandon_join();
        self.renegotiations.clear();
        self.transfers.cancel_all(&self.connections).await;
        self.connections.close_all().await;
        self.delivery.stop();
        self.signaling.disconnect().await;
        self.relay_rx = None;
        self.retry_sweep = None;
    }
}

async fn recv_opt<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => future::pending().await,
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn tick_opt(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}
