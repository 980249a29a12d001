use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_STUN_ADDR: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_STUN_ADDR_2: &str = "stun:stun1.l.google.com:19302";

/// Default direct-channel chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: u32 = 16 * 1024;

/// Milliseconds since the unix epoch, as carried in wire timestamps.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
