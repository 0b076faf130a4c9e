//! Configuration file resolution and bootstrap loading
//!
//! Config file priority order:
//! 1. Command-line argument (highest priority)
//! 2. `SEATWATCH_CONFIG` environment variable
//! 3. User config file (`~/.config/seatwatch/config.toml` on Linux)
//! 4. System config file (`/etc/seatwatch/config.toml`, Linux only)
//!
//! When none of these exist the services run on compiled defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SEATWATCH_CONFIG";

/// Bootstrap configuration shared by every SeatWatch service
///
/// Services flatten this into their own TOML structure, so a single file
/// carries both the bootstrap keys and the service sections.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    /// Path to SQLite database file; falls back to [`default_database_path`]
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Database path after applying the compiled default
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Locate the config file following the priority order in the module docs
///
/// Returns `None` when no candidate exists; callers then use defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    if let Some(path) = dirs::config_dir().map(|d| d.join("seatwatch").join("config.toml")) {
        if path.exists() {
            return Some(path);
        }
    }

    // Priority 4: System-wide config
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/seatwatch/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Read and deserialize a TOML file into any service config structure
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Read config {} failed: {}", path.display(), e))
    })?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse config {} failed: {}", path.display(), e)))
}

/// Get OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/seatwatch (or /var/lib/seatwatch for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("seatwatch"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/seatwatch"))
            .join("seatwatch.db")
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("seatwatch"))
            .unwrap_or_else(|| PathBuf::from("./seatwatch_data"))
            .join("seatwatch.db")
    }
}
