//! # Realtime Configuration
//!
//! Settings for the station hub, the transports and the station client.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     GALLEY_TOKEN=s3cret                                                │
//! │     GALLEY_ALLOWED_ORIGINS=http://kds.local,http://pass.local          │
//! │     GALLEY_HEARTBEAT_SECS=10                                           │
//! │     GALLEY_BACKUP_DIR=/var/backups/galley                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     $GALLEY_CONFIG, or                                                 │
//! │     ~/.config/galley/galley.toml (Linux)                               │
//! │     ~/Library/Application Support/com.galley.kitchen/galley.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [auth]
//! token = "s3cret"
//! allowed_origins = ["http://kds.local"]
//!
//! [hub]
//! heartbeat_interval_secs = 10
//! queue_capacity = 64
//!
//! [client]
//! server_url = "http://127.0.0.1:8080"
//! fallback_after = 3
//!
//! [backup]
//! dir = "/var/backups/galley"
//! keep = 24
//! debounce_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{RealtimeError, RealtimeResult};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "GALLEY_CONFIG";

// =============================================================================
// Auth Settings
// =============================================================================

/// Station access settings.
///
/// Without a token every station route is open: any caller that can reach
/// the server may subscribe, and may bump or recall tickets as any station
/// id. Set a token on anything but a closed kitchen network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Shared station token. `None` disables the check.
    #[serde(default)]
    pub token: Option<String>,

    /// Origins allowed to open an SSE stream. Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl AuthSettings {
    /// True when no token is configured and station routes accept anyone.
    pub fn is_open(&self) -> bool {
        self.token.is_none()
    }

    /// Checks a presented token against the configured one.
    pub fn token_matches(&self, presented: Option<&str>) -> bool {
        match self.token.as_deref() {
            None => true,
            Some(expected) => presented == Some(expected),
        }
    }

    /// Checks a request `Origin` header against the allow-list.
    ///
    /// Requests without an `Origin` header (non-browser clients) pass.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(_) if self.allowed_origins.is_empty() => true,
            Some(origin) => self
                .allowed_origins
                .iter()
                .any(|allowed| allowed.trim_end_matches('/') == origin.trim_end_matches('/')),
        }
    }
}

// =============================================================================
// Hub Settings
// =============================================================================

/// Station hub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Heartbeat interval (seconds). Subscribers silent for two windows are dropped.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Per-subscriber outbound queue. A full queue drops the event for that subscriber.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for HubSettings {
    fn default() -> Self {
        HubSettings {
            heartbeat_interval_secs: default_heartbeat_interval(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl HubSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

// =============================================================================
// Client Settings
// =============================================================================

/// Station client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Base HTTP URL of the kitchen server.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Initial backoff duration (milliseconds) for reconnection.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds) for reconnection.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Consecutive failures on one transport before trying the other.
    #[serde(default = "default_fallback_after")]
    pub fallback_after: u32,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    30
}
fn default_fallback_after() -> u32 {
    3
}

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettings {
            server_url: default_server_url(),
            connect_timeout_secs: default_connect_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            fallback_after: default_fallback_after(),
        }
    }
}

// =============================================================================
// Backup Settings
// =============================================================================

/// Opportunistic backup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Directory receiving database copies. `None` disables backups.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Quiet period after the last order before a copy is written (seconds).
    #[serde(default = "default_debounce")]
    pub debounce_secs: u64,

    /// Number of copies kept; older ones are deleted after each backup.
    #[serde(default = "default_keep")]
    pub keep: usize,
}

fn default_debounce() -> u64 {
    30
}

fn default_keep() -> usize {
    24
}

impl Default for BackupSettings {
    fn default() -> Self {
        BackupSettings {
            dir: None,
            debounce_secs: default_debounce(),
            keep: default_keep(),
        }
    }
}

// =============================================================================
// Main Realtime Configuration
// =============================================================================

/// Complete realtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub client: ClientSettings,

    #[serde(default)]
    pub backup: BackupSettings,
}

impl RealtimeConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> RealtimeResult<Self> {
        let mut config = match resolve_config_path(config_path) {
            Some(path) if path.exists() => {
                info!(?path, "Loading realtime config from file");
                Self::from_toml_str(&std::fs::read_to_string(&path)?)?
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

    pub fn from_toml_str(contents: &str) -> RealtimeResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> RealtimeResult<()> {
        if self.hub.heartbeat_interval_secs == 0 {
            return Err(RealtimeError::InvalidConfig(
                "heartbeat_interval_secs must be greater than 0".into(),
            ));
        }

        if self.hub.queue_capacity == 0 {
            return Err(RealtimeError::InvalidConfig(
                "queue_capacity must be greater than 0".into(),
            ));
        }

        if self.backup.keep == 0 {
            return Err(RealtimeError::InvalidConfig(
                "backup keep must be greater than 0".into(),
            ));
        }

        if self.client.fallback_after == 0 {
            return Err(RealtimeError::InvalidConfig(
                "fallback_after must be greater than 0".into(),
            ));
        }

        if matches!(self.auth.token.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(RealtimeError::InvalidConfig("token must not be blank".into()));
        }

        let url = url::Url::parse(&self.client.server_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RealtimeError::InvalidUrl(format!(
                "Server URL must start with http:// or https://, got: {}",
                self.client.server_url
            )));
        }

        Ok(())
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("GALLEY_TOKEN") {
            debug!("Overriding station token from environment");
            self.auth.token = Some(token);
        }

        if let Some(origins) = lookup("GALLEY_ALLOWED_ORIGINS") {
            self.auth.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
            debug!(origins = self.auth.allowed_origins.len(), "Overriding allowed origins from environment");
        }

        if let Some(secs) = lookup("GALLEY_HEARTBEAT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                debug!(secs, "Overriding heartbeat interval from environment");
                self.hub.heartbeat_interval_secs = secs;
            }
        }

        if let Some(dir) = lookup("GALLEY_BACKUP_DIR") {
            debug!(dir = %dir, "Overriding backup directory from environment");
            self.backup.dir = Some(PathBuf::from(dir));
        }
    }
}

/// Resolves the config file: explicit path, then `$GALLEY_CONFIG`, then the
/// platform config directory.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .or_else(|| {
            directories::ProjectDirs::from("com", "galley", "kitchen")
                .map(|dirs| dirs.config_dir().join("galley.toml"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = RealtimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hub.heartbeat_interval(), Duration::from_secs(10));
        assert!(config.backup.dir.is_none());
        assert_eq!(config.backup.keep, 24);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RealtimeConfig::from_toml_str(
            r#"
            [auth]
            token = "s3cret"

            [hub]
            heartbeat_interval_secs = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.token.as_deref(), Some("s3cret"));
        assert_eq!(config.hub.heartbeat_interval_secs, 4);
        assert_eq!(config.hub.queue_capacity, 64);
        assert_eq!(config.client.fallback_after, 3);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GALLEY_TOKEN", "from-env"),
            ("GALLEY_ALLOWED_ORIGINS", "http://a.local, http://b.local,"),
            ("GALLEY_HEARTBEAT_SECS", "3"),
            ("GALLEY_BACKUP_DIR", "/tmp/galley-backups"),
        ]
        .into_iter()
        .collect();

        let mut config = RealtimeConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.auth.token.as_deref(), Some("from-env"));
        assert_eq!(config.auth.allowed_origins, vec!["http://a.local", "http://b.local"]);
        assert_eq!(config.hub.heartbeat_interval_secs, 3);
        assert_eq!(config.backup.dir, Some(PathBuf::from("/tmp/galley-backups")));
    }

    #[test]
    fn test_validation() {
        let mut config = RealtimeConfig::default();
        config.hub.heartbeat_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = RealtimeConfig::default();
        config.backup.keep = 0;
        assert!(matches!(config.validate(), Err(RealtimeError::InvalidConfig(_))));

        let mut config = RealtimeConfig::default();
        config.client.server_url = "ws://localhost:8080".to_string();
        assert!(matches!(config.validate(), Err(RealtimeError::InvalidUrl(_))));

        let mut config = RealtimeConfig::default();
        config.auth.token = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_and_origin_checks() {
        let open = AuthSettings::default();
        assert!(open.is_open());
        assert!(open.token_matches(None));
        assert!(open.token_matches(Some("anything")));
        assert!(open.origin_allowed(Some("http://anything")));

        let locked = AuthSettings {
            token: Some("s3cret".to_string()),
            allowed_origins: vec!["http://kds.local/".to_string()],
        };
        assert!(!locked.is_open());
        assert!(locked.token_matches(Some("s3cret")));
        assert!(!locked.token_matches(Some("guess")));
        assert!(!locked.token_matches(None));

        assert!(locked.origin_allowed(Some("http://kds.local")));
        assert!(!locked.origin_allowed(Some("http://evil.example")));
        assert!(locked.origin_allowed(None));
    }
}
