//! Minimal configuration loading for the tally listener.
//!
//! This crate provides configuration loading with minimal dependencies,
//! so both the protocol crate and the daemon can import it freely.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tallyconf::TallyConfig;
//!
//! let config = TallyConfig::load().expect("Failed to load config");
//! println!("server: {}", config.server.address());
//! for name in config.listener.display_names() {
//!     println!("endpoint: {}", name);
//! }
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/tally-listener/config.toml` (system)
//! 2. `~/.config/tally-listener/config.toml` (user)
//! 3. `./tally-listener.toml` (local override, or the `--config` path)
//! 4. Environment variables (`TALLY_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [server]
//! host = "192.168.188.47"
//! port = 4455
//!
//! [listener]
//! name_prefix = "M5Atom"
//! tag = "e4f1a0"
//!
//! [timing]
//! reconnect_interval_ms = 5000
//! connect_timeout_ms = 4000
//! registration_delay_ms = 100
//! flash_pulse_ms = 200
//! flash_pulses = 3
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod infra;
pub mod listener;
pub mod loader;

pub use infra::{ServerConfig, TelemetryConfig, TimingConfig};
pub use listener::{ListenerConfig, SLOT_COUNT};
pub use loader::{discover_config_files_with_override, user_config_path, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("Failed to remove settings file {path}: {source}")]
    Reset {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Complete listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TallyConfig {
    /// Where the TallyArbiter server is.
    #[serde(default)]
    pub server: ServerConfig,

    /// How the four endpoints name themselves.
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Retry, registration and flash timing.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Logging.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl TallyConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./tally-listener.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = TallyConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::apply_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Build TOML manually for nicer formatting
        let mut output = String::new();

        output.push_str("# Tally listener configuration\n\n");

        output.push_str("[server]\n");
        output.push_str(&format!("host = \"{}\"\n", self.server.host));
        output.push_str(&format!("port = {}\n", self.server.port));
        output.push_str(&format!("path = \"{}\"\n", self.server.path));

        output.push_str("\n[listener]\n");
        output.push_str(&format!("name_prefix = \"{}\"\n", self.listener.name_prefix));
        output.push_str(&format!("tag = \"{}\"\n", self.listener.tag));

        output.push_str("\n[timing]\n");
        output.push_str(&format!(
            "reconnect_interval_ms = {}\n",
            self.timing.reconnect_interval_ms
        ));
        output.push_str(&format!(
            "connect_timeout_ms = {}\n",
            self.timing.connect_timeout_ms
        ));
        output.push_str(&format!(
            "registration_delay_ms = {}\n",
            self.timing.registration_delay_ms
        ));
        output.push_str(&format!("flash_pulse_ms = {}\n", self.timing.flash_pulse_ms));
        output.push_str(&format!("flash_pulses = {}\n", self.timing.flash_pulses));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output
    }
}

/// Delete the per-user settings file so the next start runs on defaults.
///
/// Returns the removed path, or `None` when there was nothing to remove.
pub fn reset_user_settings() -> Result<Option<PathBuf>, ConfigError> {
    match user_config_path() {
        Some(path) => remove_settings_file(&path),
        None => Ok(None),
    }
}

fn remove_settings_file(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(Some(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Reset {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
