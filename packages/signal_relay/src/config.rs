use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RelayError;

// =============================================================================
// File config (figment-deserialized from defaults / relay.toml / env vars)
// =============================================================================
//
//   relay.toml:      [relay]
//                    max_message_bytes = 8192
//
//   env var:         RELAY_RELAY__MAX_MESSAGE_BYTES=8192   (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory of client assets served for any non-API path.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
        }
    }
}

/// Connection policy (lives under `[relay]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    #[serde(default = "default_pong_wait_secs")]
    pub pong_wait_secs: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_write_wait_secs")]
    pub write_wait_secs: u64,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: default_max_message_bytes(),
            pong_wait_secs: default_pong_wait_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            write_wait_secs: default_write_wait_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_message_bytes() -> usize {
    4096
}
fn default_pong_wait_secs() -> u64 {
    60
}
fn default_ping_interval_secs() -> u64 {
    54
}
fn default_write_wait_secs() -> u64 {
    10
}

/// Build a figment that layers: defaults → TOML file → RELAY_* env vars.
///
/// A missing file contributes nothing. Env vars use double-underscore for
/// nesting: `RELAY_SERVER__PORT=9000` → `server.port = 9000`.
pub fn load_config(config_path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(FileConfig::default()));
    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed("RELAY_").split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig)
// =============================================================================

/// Per-connection transport and liveness policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    /// Largest inbound message accepted before the connection is dropped
    pub max_message_bytes: usize,
    /// Idle-read deadline, refreshed by every inbound frame including pongs
    pub pong_wait: Duration,
    /// Period between liveness pings; always shorter than `pong_wait`
    pub ping_interval: Duration,
    /// Deadline for any single outbound write
    pub write_wait: Duration,
}

impl RelayConfig {
    pub fn from_file(fc: &RelayFileConfig) -> Result<Self, RelayError> {
        if fc.max_message_bytes == 0 {
            return Err(RelayError::InvalidConfig(
                "relay.max_message_bytes must be positive".into(),
            ));
        }
        if fc.pong_wait_secs == 0 || fc.ping_interval_secs == 0 || fc.write_wait_secs == 0 {
            return Err(RelayError::InvalidConfig(
                "relay timeouts must be positive".into(),
            ));
        }
        if fc.ping_interval_secs >= fc.pong_wait_secs {
            return Err(RelayError::InvalidConfig(format!(
                "relay.ping_interval_secs ({}) must be shorter than relay.pong_wait_secs ({})",
                fc.ping_interval_secs, fc.pong_wait_secs
            )));
        }
        Ok(Self {
            max_message_bytes: fc.max_message_bytes,
            pong_wait: Duration::from_secs(fc.pong_wait_secs),
            ping_interval: Duration::from_secs(fc.ping_interval_secs),
            write_wait: Duration::from_secs(fc.write_wait_secs),
        })
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        let fc = RelayFileConfig::default();
        Self {
            max_message_bytes: fc.max_message_bytes,
            pong_wait: Duration::from_secs(fc.pong_wait_secs),
            ping_interval: Duration::from_secs(fc.ping_interval_secs),
            write_wait: Duration::from_secs(fc.write_wait_secs),
        }
    }
}
