mod config;
mod room;
mod signaling;

pub use config::*;
pub use room::*;
pub use signaling::*;

use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Shared by every socket task.
pub struct AppState {
    pub signaling: SignalingService,
    pub rooms: RoomManager,
}

impl AppState {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            signaling: SignalingService::new(config.ice_servers.clone()),
            rooms: RoomManager::new(config.max_room_size),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws/{peer_id}", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

/// Serves the relay on an already bound listener until the process exits.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    info!("Relay listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
