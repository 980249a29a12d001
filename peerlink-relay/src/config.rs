use anyhow::{Context, Result};
use peerlink_core::IceServerConfig;
use peerlink_core::utils::{DEFAULT_STUN_ADDR, DEFAULT_STUN_ADDR_2};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

/// Relay settings. File: `$PEERLINK_RELAY_CONFIG` (TOML).
/// Env overrides: PEERLINK_RELAY_ADDR, TURN_URL, TURN_USERNAME, TURN_CREDENTIAL.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Sent to every client in `ice-config` right after `welcome`.
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServerConfig>,
    /// 0 disables the limit.
    #[serde(default)]
    pub max_room_size: usize,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![IceServerConfig {
        urls: vec![DEFAULT_STUN_ADDR.to_string(), DEFAULT_STUN_ADDR_2.to_string()],
        username: None,
        credential: None,
    }]
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            ice_servers: default_ice_servers(),
            max_room_size: 0,
        }
    }
}

impl RelayConfig {
    /// Defaults, then the config file (if named), then environment.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading relay config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing relay config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match env("PEERLINK_RELAY_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(addr) = env("PEERLINK_RELAY_ADDR") {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("invalid PEERLINK_RELAY_ADDR {addr:?}"))?;
        }

        if let Some(url) = env("TURN_URL") {
            config.ice_servers.push(IceServerConfig {
                urls: vec![url],
                username: env("TURN_USERNAME"),
                credential: env("TURN_CREDENTIAL"),
            });
        }

        Ok(config)
    }
}
