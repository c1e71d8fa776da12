//! Configuration types with defaults for every field.
//!
//! The on-disk format is TOML. Loading (file lookup, env overrides) lives in
//! `tether-kernel`; this module only describes the shape.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default pattern pushed by `play_code` when the caller omits `code`.
pub const DEFAULT_PATTERN: &str = r#"note("c d e f g").s("piano").slow(2)"#;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    /// Address the HTTP/WebSocket server binds to.
    pub listen_addr: String,
    /// Fallback log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Correlation bridge timeouts.
    pub bridge: BridgeConfig,
    /// Peer connection settings.
    pub peers: PeerSettings,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            bridge: BridgeConfig::default(),
            peers: PeerSettings::default(),
        }
    }
}

/// Timeouts applied to bridge round-trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long `get_button_state` waits for a `state-response`.
    pub state_timeout_ms: u64,
    /// How long `get_currently_playing_code` waits for a `current-code-response`.
    pub code_timeout_ms: u64,
}

impl BridgeConfig {
    pub fn state_timeout(&self) -> Duration {
        Duration::from_millis(self.state_timeout_ms)
    }

    pub fn code_timeout(&self) -> Duration {
        Duration::from_millis(self.code_timeout_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            state_timeout_ms: 10_000,
            code_timeout_ms: 5_000,
        }
    }
}

/// Settings for connected peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerSettings {
    /// Largest inbound WebSocket frame accepted from a peer, in bytes.
    pub max_message_size: usize,
    /// Capacity of each peer's outbound queue.
    pub outbound_queue: usize,
    /// Pattern used by `play_code` when no code is given.
    pub default_pattern: String,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            max_message_size: 1024 * 1024,
            outbound_queue: 64,
            default_pattern: DEFAULT_PATTERN.to_string(),
        }
    }
}
