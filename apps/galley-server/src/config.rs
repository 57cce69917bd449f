//! Server configuration.
//!
//! One TOML file holds both the `[server]` table and the realtime tables
//! (`[auth]`, `[hub]`, `[client]`, `[backup]`):
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//! database = "/var/lib/galley/galley.db"
//! max_connections = 8
//!
//! [auth]
//! token = "s3cret"
//! ```
//!
//! `GALLEY_BIND` and `GALLEY_DATABASE` override the `[server]` table; the
//! realtime overrides are applied by [`RealtimeConfig::apply_env_overrides`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use galley_realtime::config::resolve_config_path;
use galley_realtime::RealtimeConfig;

/// Listener and database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address the HTTP server binds to
    pub bind: String,

    /// SQLite database file
    pub database: PathBuf,

    /// Pool size
    pub max_connections: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind: "0.0.0.0:8080".to_string(),
            database: PathBuf::from("galley.db"),
            max_connections: 8,
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(flatten)]
    pub realtime: RealtimeConfig,
}

impl ServerConfig {
    /// Loads defaults, then the config file if one exists, then environment
    /// overrides, then validates.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = match resolve_config_path(config_path) {
            Some(path) if path.exists() => {
                info!(?path, "Loading server config from file");
                Self::from_file(&path)?
            }
            Some(path) => {
                debug!(?path, "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Unreadable(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup("GALLEY_BIND") {
            debug!(bind = %bind, "Overriding bind address from environment");
            self.server.bind = bind;
        }

        if let Some(database) = lookup("GALLEY_DATABASE") {
            debug!(database = %database, "Overriding database path from environment");
            self.server.database = PathBuf::from(database);
        }

        self.realtime.apply_env_overrides(lookup);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        if self.server.max_connections == 0 {
            return Err(ConfigError::InvalidValue("max_connections".to_string()));
        }

        self.realtime
            .validate()
            .map_err(|e| ConfigError::Realtime(e.to_string()))
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("bind ({})", self.server.bind)))
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Cannot read config file {0}")]
    Unreadable(String),

    #[error("Invalid config file: {0}")]
    Parse(String),

    #[error("Invalid realtime configuration: {0}")]
    Realtime(String),
}
