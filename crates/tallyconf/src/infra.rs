//! Infrastructure configuration - where the server lives, how fast we retry,
//! how loudly we log.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// TallyArbiter server address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host name or IP.
    /// Default: 127.0.0.1
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,

    /// Server port.
    /// Default: 4455
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,

    /// Socket.IO endpoint path.
    /// Default: /socket.io/
    #[serde(default = "ServerConfig::default_path")]
    pub path: String,
}

impl ServerConfig {
    fn default_host() -> String {
        "127.0.0.1".to_string()
    }

    fn default_port() -> u16 {
        4455
    }

    fn default_path() -> String {
        "/socket.io/".to_string()
    }

    /// WebSocket URL for an Engine.IO v4 websocket-only session.
    pub fn websocket_url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        let path = if path.ends_with('/') { path } else { format!("{}/", path) };
        format!(
            "ws://{}:{}{}?EIO=4&transport=websocket",
            self.host, self.port, path
        )
    }

    /// `host:port`, for logs and the diagnostic dump.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            path: Self::default_path(),
        }
    }
}

/// Fixed timing knobs for the session and the flash sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Interval between reconnect attempts while disconnected.
    /// Default: 5000
    #[serde(default = "TimingConfig::default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Give up on a single connect attempt after this long.
    /// Default: 4000
    #[serde(default = "TimingConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Pause between consecutive listener registrations.
    /// Default: 100
    #[serde(default = "TimingConfig::default_registration_delay_ms")]
    pub registration_delay_ms: u64,

    /// Duration of each flash pulse and of the dark gap after it.
    /// Default: 200
    #[serde(default = "TimingConfig::default_flash_pulse_ms")]
    pub flash_pulse_ms: u64,

    /// Number of flash pulses.
    /// Default: 3
    #[serde(default = "TimingConfig::default_flash_pulses")]
    pub flash_pulses: u32,
}

impl TimingConfig {
    fn default_reconnect_interval_ms() -> u64 {
        5000
    }

    fn default_connect_timeout_ms() -> u64 {
        4000
    }

    fn default_registration_delay_ms() -> u64 {
        100
    }

    fn default_flash_pulse_ms() -> u64 {
        200
    }

    fn default_flash_pulses() -> u32 {
        3
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Capped at the reconnect interval so a hung attempt is over before
    /// the next one falls due.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.min(self.reconnect_interval_ms))
    }

    pub fn registration_delay(&self) -> Duration {
        Duration::from_millis(self.registration_delay_ms)
    }

    pub fn flash_pulse(&self) -> Duration {
        Duration::from_millis(self.flash_pulse_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: Self::default_reconnect_interval_ms(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
            registration_delay_ms: Self::default_registration_delay_ms(),
            flash_pulse_ms: Self::default_flash_pulse_ms(),
            flash_pulses: Self::default_flash_pulses(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level or `EnvFilter` directive string.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
