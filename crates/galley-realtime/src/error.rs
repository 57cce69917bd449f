//! # Realtime Error Types
//!
//! Error types for the kitchen service, the station hub and the station client.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Realtime Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  InvalidMessage         │ │
//! │  │  InvalidUrl     │  │  Disconnected   │  │  Serialization          │ │
//! │  │  ConfigLoad     │  │  Timeout, Stale │  │  NotRegistered          │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Kitchen      │  │     Access      │                              │
//! │  │                 │  │                 │                              │
//! │  │  Core (rules)   │  │  Unauthorized   │                              │
//! │  │  Database       │  │  OriginRejected │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use galley_core::{CoreError, ValidationError};
use galley_db::DbError;
use thiserror::Error;

/// Result type alias for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

#[derive(Debug, Error)]
pub enum RealtimeError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Disconnected from kitchen server")]
    Disconnected,

    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// No frame arrived for two heartbeat windows.
    #[error("Connection stale: no frame for {0} seconds")]
    Stale(u64),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Connection has not registered a station")]
    NotRegistered,

    // =========================================================================
    // Access Errors
    // =========================================================================
    #[error("Missing or invalid station token")]
    Unauthorized,

    #[error("Origin not allowed: {0}")]
    OriginRejected(String),

    // =========================================================================
    // Kitchen Errors
    // =========================================================================
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Database(#[from] DbError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for RealtimeError {
    fn from(err: ValidationError) -> Self {
        RealtimeError::Core(CoreError::Validation(err))
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        RealtimeError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for RealtimeError {
    fn from(err: url::ParseError) -> Self {
        RealtimeError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => RealtimeError::Disconnected,
            WsError::Io(io) => RealtimeError::ConnectionFailed(io.to_string()),
            other => RealtimeError::WebSocketError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for RealtimeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            RealtimeError::ConnectionFailed(err.to_string())
        } else {
            RealtimeError::Http(err.to_string())
        }
    }
}

impl From<std::io::Error> for RealtimeError {
    fn from(err: std::io::Error) -> Self {
        RealtimeError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for RealtimeError {
    fn from(err: toml::de::Error) -> Self {
        RealtimeError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl RealtimeError {
    /// Returns true if the station client should reconnect after this error.
    ///
    /// ## Retryable Errors
    /// - Connection failures, timeouts, staleness
    /// - Dropped connections and HTTP failures
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Rejected credentials or origin
    pub fn is_retryable(&self) -> bool {
        match self {
            RealtimeError::ConnectionFailed(_)
            | RealtimeError::Disconnected
            | RealtimeError::Timeout(_)
            | RealtimeError::Stale(_)
            | RealtimeError::WebSocketError(_)
            | RealtimeError::Http(_) => true,
            RealtimeError::Database(db) => db.is_transient(),
            _ => false,
        }
    }

    /// Returns true if the caller sent something the kitchen refuses.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RealtimeError::Core(_)
                | RealtimeError::NotRegistered
                | RealtimeError::InvalidMessage(_)
                | RealtimeError::Unauthorized
                | RealtimeError::OriginRejected(_)
                | RealtimeError::Database(DbError::NotFound { .. })
        )
    }
}
