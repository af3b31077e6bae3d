//! Bootstrap configuration
//!
//! TOML file layer of the configuration. Resolution priority, highest first:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! The first two tiers live in the service binary (clap); this module owns
//! the TOML schema and the compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_DATABASE_PATH: &str = "./banlist.db";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:5790";
pub const DEFAULT_SESSION_WINDOW_SECS: u64 = 90;
pub const DEFAULT_ITEM_DELAY_MS: u64 = 500;
pub const DEFAULT_DIGEST_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Configuration loaded from the TOML file
///
/// Every field is optional in the file; missing fields take compiled defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// HTTP listen address for the queue bridge
    pub listen: String,

    /// Webhook for summaries and errors
    pub webhook_url: Option<String>,

    /// Webhook for management audit events (whitelist hits)
    pub management_webhook_url: Option<String>,

    /// Inactivity window closing a server's batch session
    pub session_window_secs: u64,

    /// Pause after each processed observation
    pub item_delay_ms: u64,

    /// Chat-feed digest period, 0 disables
    pub digest_interval_secs: u64,

    /// Dispatcher queue bound
    pub queue_capacity: usize,

    /// Upper bound on retrying a locked database
    pub max_lock_wait_ms: u64,

    /// Directory of bulk JSON files
    pub batch_dir: Option<PathBuf>,

    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            listen: DEFAULT_LISTEN.to_string(),
            webhook_url: None,
            management_webhook_url: None,
            session_window_secs: DEFAULT_SESSION_WINDOW_SECS,
            item_delay_ms: DEFAULT_ITEM_DELAY_MS,
            digest_interval_secs: DEFAULT_DIGEST_INTERVAL_SECS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
            batch_dir: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    pub fn session_window(&self) -> Duration {
        Duration::from_secs(self.session_window_secs)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    /// `None` when the digest is disabled
    pub fn digest_interval(&self) -> Option<Duration> {
        (self.digest_interval_secs > 0).then(|| Duration::from_secs(self.digest_interval_secs))
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.session_window_secs == 0 {
            return Err(Error::Config("session_window_secs must be greater than 0".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Parse TOML configuration text
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Load the TOML configuration file
///
/// A missing file is not fatal: a warning is logged and defaults are used.
/// An unreadable or malformed file is a configuration error.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        info!("No config file given, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!("Config file not found: {} (using built-in defaults)", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config = parse_toml_config(&content)?;
    info!("Loaded config file: {}", path.display());
    Ok(config)
}
