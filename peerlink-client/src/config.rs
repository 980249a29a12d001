use crate::error::{Result, SessionError};
use peerlink_core::IceServerConfig;
use peerlink_core::utils::{DEFAULT_CHUNK_SIZE, DEFAULT_STUN_ADDR, DEFAULT_STUN_ADDR_2};
use std::time::Duration;

/// Relay link settings.
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Upper bound on establishing the relay socket.
    pub connect_timeout: Duration,
    /// Upper bound on waiting for `room-joined` after a join intent.
    pub join_timeout: Duration,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    /// Reconnect attempt `n` waits `n * reconnect_base_delay`.
    pub reconnect_base_delay: Duration,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(10),
            auto_reconnect: true,
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_secs(1),
        }
    }
}

/// Acknowledgement and retry policy for text messages.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Total send attempts, the first one included.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub sweep_interval: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub chunk_size: u32,
    /// Inbound requests with a smaller `chunkSize` are refused.
    pub min_chunk_size: u32,
    /// Inbound requests needing more chunks than this are refused.
    pub max_chunks: u32,
    /// Chunks emitted per pump turn before yielding back to the session loop.
    pub chunks_per_tick: usize,
    pub verify_checksums: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            min_chunk_size: 1024,
            max_chunks: 1 << 20,
            chunks_per_tick: 16,
            verify_checksums: true,
        }
    }
}

/// WebRTC session settings. The relay may replace `ice_servers` via `ice-config`.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerConfig>,
    pub channel_label: String,
    /// Consecutive transport losses to one room member that are answered
    /// with a new negotiation. An open channel resets the count.
    pub max_renegotiations: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig {
                urls: vec![DEFAULT_STUN_ADDR.to_owned(), DEFAULT_STUN_ADDR_2.to_owned()],
                username: None,
                credential: None,
            }],
            channel_label: "data".to_owned(),
            max_renegotiations: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub signaling: SignalingConfig,
    pub delivery: DeliveryConfig,
    pub transfer: TransferConfig,
    pub transport: TransportConfig,
}

impl ClientConfig {
    /// Checked by `initialize` before anything is started.
    pub fn validate(&self) -> Result<()> {
        let transfer = &self.transfer;
        if transfer.chunk_size == 0 {
            return Err(invalid("transfer.chunk_size must be positive"));
        }
        if transfer.chunk_size < transfer.min_chunk_size {
            return Err(invalid(format!(
                "transfer.chunk_size {} is below transfer.min_chunk_size {}",
                transfer.chunk_size, transfer.min_chunk_size
            )));
        }
        if transfer.chunks_per_tick == 0 {
            return Err(invalid("transfer.chunks_per_tick must be positive"));
        }
        if self.delivery.sweep_interval.is_zero() {
            return Err(invalid("delivery.sweep_interval must be positive"));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> SessionError {
    SessionError::InvalidConfig(reason.into())
}
