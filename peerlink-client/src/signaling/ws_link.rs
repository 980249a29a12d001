use crate::signaling::{RelayEvent, RelayLink};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Relay link over a websocket.
#[derive(Default)]
pub struct WebSocketRelayLink {
    outbound: Option<mpsc::UnboundedSender<Message>>,
    send_task: Option<JoinHandle<()>>,
    recv_task: Option<JoinHandle<()>>,
}

impl WebSocketRelayLink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelayLink for WebSocketRelayLink {
    async fn connect(&mut self, url: &str, inbound: mpsc::Sender<RelayEvent>) -> Result<()> {
        self.close().await;

        let (socket, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to relay at {}", url))?;
        info!("Relay socket open: {}", url);

        let (mut sender, mut receiver) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let send_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = sender.close().await;
        });

        let recv_task = tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if inbound.send(RelayEvent::Frame(text.to_string())).await.is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Relay socket error: {}", e);
                        break;
                    }
                }
            }
            debug!("Relay socket reader finished");
            let _ = inbound.send(RelayEvent::Closed).await;
        });

        self.outbound = Some(tx);
        self.send_task = Some(send_task);
        self.recv_task = Some(recv_task);
        Ok(())
    }

    async fn send(&self, text: String) -> Result<()> {
        let outbound = self.outbound.as_ref().context("Relay socket is not open")?;
        outbound
            .send(Message::Text(text.into()))
            .context("Relay socket writer has stopped")?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(recv_task) = self.recv_task.take() {
            recv_task.abort();
        }
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Message::Close(None));
        }
        // The writer drains the close frame, then exits on its own.
        self.send_task.take();
    }
}

impl Drop for WebSocketRelayLink {
    fn drop(&mut self) {
        if let Some(recv_task) = self.recv_task.take() {
            recv_task.abort();
        }
    }
}
