//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, TallyConfig};
use std::env;
use std::path::{Path, PathBuf};

/// System-wide config file.
pub const SYSTEM_CONFIG: &str = "/etc/tally-listener/config.toml";

/// Local override in the working directory.
pub const LOCAL_CONFIG: &str = "tally-listener.toml";

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Path of the per-user config file, whether or not it exists.
pub fn user_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("tally-listener/config.toml"))
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from(SYSTEM_CONFIG);
    if system.exists() {
        files.push(system);
    }

    if let Some(user) = user_config_path() {
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and lay its values over `config`.
pub fn apply_file(config: &mut TallyConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Lay the keys present in a TOML document over `config`.
///
/// Keys that are absent leave the existing value alone, so files loaded
/// later only override what they actually mention.
pub fn apply_toml(config: &mut TallyConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(server) = table.get("server").and_then(|v| v.as_table()) {
        if let Some(v) = server.get("host").and_then(|v| v.as_str()) {
            config.server.host = v.to_string();
        }
        if let Some(v) = server.get("port").and_then(|v| v.as_integer()) {
            config.server.port = u16::try_from(v).map_err(|_| ConfigError::Invalid {
                key: "server.port".to_string(),
                message: format!("{} is not a valid port", v),
            })?;
        }
        if let Some(v) = server.get("path").and_then(|v| v.as_str()) {
            config.server.path = v.to_string();
        }
    }

    if let Some(listener) = table.get("listener").and_then(|v| v.as_table()) {
        if let Some(v) = listener.get("name_prefix").and_then(|v| v.as_str()) {
            config.listener.name_prefix = v.to_string();
        }
        if let Some(v) = listener.get("tag").and_then(|v| v.as_str()) {
            config.listener.tag = v.to_string();
        }
    }

    if let Some(timing) = table.get("timing").and_then(|v| v.as_table()) {
        if let Some(v) = timing.get("reconnect_interval_ms").and_then(|v| v.as_integer()) {
            config.timing.reconnect_interval_ms = non_negative("timing.reconnect_interval_ms", v)?;
        }
        if let Some(v) = timing.get("connect_timeout_ms").and_then(|v| v.as_integer()) {
            config.timing.connect_timeout_ms = non_negative("timing.connect_timeout_ms", v)?;
        }
        if let Some(v) = timing.get("registration_delay_ms").and_then(|v| v.as_integer()) {
            config.timing.registration_delay_ms = non_negative("timing.registration_delay_ms", v)?;
        }
        if let Some(v) = timing.get("flash_pulse_ms").and_then(|v| v.as_integer()) {
            config.timing.flash_pulse_ms = non_negative("timing.flash_pulse_ms", v)?;
        }
        if let Some(v) = timing.get("flash_pulses").and_then(|v| v.as_integer()) {
            config.timing.flash_pulses = u32::try_from(v).map_err(|_| ConfigError::Invalid {
                key: "timing.flash_pulses".to_string(),
                message: format!("{} is out of range", v),
            })?;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(())
}

fn non_negative(key: &str, value: i64) -> Result<u64, ConfigError> {
    u64::try_from(value).map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        message: format!("{} must not be negative", value),
    })
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut TallyConfig, sources: &mut ConfigSources) {
    apply_env_with(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_env_with<F>(config: &mut TallyConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("TALLY_HOST") {
        config.server.host = v;
        sources.env_overrides.push("TALLY_HOST".to_string());
    }
    if let Some(v) = lookup("TALLY_PORT") {
        if let Ok(port) = v.parse() {
            config.server.port = port;
            sources.env_overrides.push("TALLY_PORT".to_string());
        }
    }
    if let Some(v) = lookup("TALLY_TAG") {
        config.listener.tag = v;
        sources.env_overrides.push("TALLY_TAG".to_string());
    }
    if let Some(v) = lookup("TALLY_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("TALLY_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}
