use crate::error::SessionError;
use crate::session::{PendingJoin, Session, SessionCommand};
use tokio::time::Instant;
use tracing::info;

impl Session {
    pub(super) async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Initialize { endpoint, reply } => {
                if self.signaling.is_connected() {
                    let _ = reply.send(Ok(self.local_id.clone()));
                    return;
                }
                if let Err(e) = self.config.validate() {
                    let _ = reply.send(Err(e));
                    return;
                }
                let result = match self.signaling.connect(&endpoint).await {
                    Ok(rx) => {
                        self.relay_rx = Some(rx);
                        self.start_retry_sweep();
                        Ok(self.local_id.clone())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }

            SessionCommand::JoinRoom { room_id, reply } => {
                if !self.signaling.is_connected() {
                    let _ = reply.send(Err(SessionError::NotConnected));
                    return;
                }
                if self.signaling.room().is_some() || self.pending_join.is_some() {
                    info!("Leaving current room before joining '{}'", room_id);
                    self.leave_room().await;
                }

                if let Err(e) = self.signaling.join_room(room_id.clone()).await {
                    let _ = reply.send(Err(e));
                    return;
                }
                self.pending_join = Some(PendingJoin {
                    room_id,
                    deadline: Instant::now() + self.config.signaling.join_timeout,
                    reply,
                });
            }

            SessionCommand::LeaveRoom { reply } => {
                let left = self.leave_room().await;
                let _ = reply.send(left);
            }

            SessionCommand::SendMessage {
                recipient,
                content,
                reply_to,
                reply,
            } => {
                let message = self
                    .delivery
                    .send_message(&self.connections, recipient, content, reply_to)
                    .await;
                let _ = reply.send(message);
            }

            SessionCommand::BroadcastMessage { content, reply } => {
                let messages = self.delivery.broadcast(&self.connections, content).await;
                let _ = reply.send(messages);
            }

            SessionCommand::InitiateFileTransfer {
                recipient,
                file,
                reply,
            } => {
                if self.signaling.room().is_none() {
                    let _ = reply.send(Err(SessionError::NotInRoom));
                    return;
                }
                let result = self
                    .transfers
                    .initiate(&self.connections, recipient, file)
                    .await;
                let _ = reply.send(result);
            }

            SessionCommand::AcceptFileTransfer { transfer_id, reply } => {
                let result = self.transfers.accept(&self.connections, &transfer_id).await;
                let _ = reply.send(result);
            }

            SessionCommand::RejectFileTransfer { transfer_id, reply } => {
                let result = self.transfers.reject(&self.connections, &transfer_id).await;
                let _ = reply.send(result);
            }

            SessionCommand::CancelFileTransfer { transfer_id, reply } => {
                let result = self.transfers.cancel(&self.connections, &transfer_id).await;
                let _ = reply.send(result);
            }

            SessionCommand::Peers { reply } => {
                let _ = reply.send(self.connections.peers());
            }

            SessionCommand::Connection { peer_id, reply } => {
                let _ = reply.send(self.connections.connection(&peer_id));
            }

            SessionCommand::Messages { reply } => {
                let _ = reply.send(self.delivery.messages());
            }

            SessionCommand::Transfers { reply } => {
                let _ = reply.send(self.transfers.transfers());
            }

            SessionCommand::ClearHistory => {
                self.delivery.clear_history();
                self.transfers.clear_history();
            }

            SessionCommand::Disconnect { reply } => {
                info!("Disconnecting session {}", self.local_id);
                self.shutdown().await;
                let _ = reply.send(());
            }
        }
    }
}
