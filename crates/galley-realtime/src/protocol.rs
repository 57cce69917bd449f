//! # Station Wire Protocol
//!
//! Frames exchanged between station screens and the kitchen server.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Station Protocol Frames                            │
//! │                                                                         │
//! │  HANDSHAKE (WebSocket)                                                 │
//! │  ─────────────────────                                                 │
//! │  STATION ───► { "type": "register", "stationId": "grill", "token": .. }│
//! │  SERVER  ◄─── { "event": "registered", "data": { stationId, kind } }   │
//! │                                                                         │
//! │  COMMANDS (WebSocket; HTTP POST when on SSE)                           │
//! │  ─────────────────────────────────────────                             │
//! │  STATION ───► { "type": "bump" | "recall" | "urgent", "orderId": .. }  │
//! │  SERVER  ◄─── { "event": "ack", .. } or { "event": "error", .. }       │
//! │                                                                         │
//! │  FAN-OUT                                                               │
//! │  ───────                                                               │
//! │  SERVER  ───► { "event": "orderAdded", "data": { .. } }   (and others) │
//! │                                                                         │
//! │  KEEPALIVE                                                             │
//! │  ─────────                                                             │
//! │  SERVER  ───► { "event": "heartbeat", "data": { "serverTime": .. } }   │
//! │  STATION ───► { "type": "pong" }                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Server frames share the `{"event", "data"}` envelope of [`KitchenEvent`],
//! so SSE and WebSocket consumers parse the same JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use galley_core::ticket::StationCommand;
use galley_core::{KitchenEvent, StationKind};

use crate::error::{RealtimeError, RealtimeResult};

// =============================================================================
// Station → Server
// =============================================================================

/// Frames a station sends over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    /// Must be the first frame of a connection.
    Register {
        station_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    Bump { order_id: String },
    Recall { order_id: String },
    Urgent { order_id: String },
    /// Answer to a heartbeat.
    Pong,
}

impl ClientFrame {
    /// The ticket command this frame carries, if any.
    pub fn command(&self) -> Option<(StationCommand, &str)> {
        match self {
            ClientFrame::Bump { order_id } => Some((StationCommand::Bump, order_id)),
            ClientFrame::Recall { order_id } => Some((StationCommand::Recall, order_id)),
            ClientFrame::Urgent { order_id } => Some((StationCommand::Urgent, order_id)),
            ClientFrame::Register { .. } | ClientFrame::Pong => None,
        }
    }

    pub fn for_command(command: StationCommand, order_id: impl Into<String>) -> Self {
        let order_id = order_id.into();
        match command {
            StationCommand::Bump => ClientFrame::Bump { order_id },
            StationCommand::Recall => ClientFrame::Recall { order_id },
            StationCommand::Urgent => ClientFrame::Urgent { order_id },
        }
    }

    pub fn to_json(&self) -> RealtimeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> RealtimeResult<Self> {
        serde_json::from_str(json).map_err(|e| RealtimeError::InvalidMessage(e.to_string()))
    }
}

// =============================================================================
// Server → Station
// =============================================================================

/// Transport-level frames that are not kitchen events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ControlFrame {
    Registered(Registered),
    Ack(CommandAck),
    Error(ErrorFrame),
    Heartbeat(Heartbeat),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registered {
    pub station_id: String,
    pub kind: StationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAck {
    pub command: StationCommand,
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFrame {
    pub code: String,
    pub message: String,
}

impl ErrorFrame {
    pub fn from_error(err: &RealtimeError) -> Self {
        ErrorFrame {
            code: error_code(err).to_string(),
            message: client_message(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub server_time: DateTime<Utc>,
}

/// Anything the server pushes to a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Kitchen(KitchenEvent),
    Control(ControlFrame),
}

impl ServerFrame {
    pub fn heartbeat(now: DateTime<Utc>) -> Self {
        ServerFrame::Control(ControlFrame::Heartbeat(Heartbeat { server_time: now }))
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerFrame::Control(ControlFrame::Error(ErrorFrame {
            code: code.to_string(),
            message: message.into(),
        }))
    }

    /// Error frame for a failed command or registration.
    pub fn from_error(err: &RealtimeError) -> Self {
        ServerFrame::Control(ControlFrame::Error(ErrorFrame::from_error(err)))
    }

    /// Wire name (the `event` field).
    pub fn name(&self) -> &'static str {
        match self {
            ServerFrame::Kitchen(event) => event.name(),
            ServerFrame::Control(ControlFrame::Registered(_)) => "registered",
            ServerFrame::Control(ControlFrame::Ack(_)) => "ack",
            ServerFrame::Control(ControlFrame::Error(_)) => "error",
            ServerFrame::Control(ControlFrame::Heartbeat(_)) => "heartbeat",
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, ServerFrame::Control(ControlFrame::Heartbeat(_)))
    }

    pub fn to_json(&self) -> RealtimeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> RealtimeResult<Self> {
        serde_json::from_str(json).map_err(|e| RealtimeError::InvalidMessage(e.to_string()))
    }
}

impl From<KitchenEvent> for ServerFrame {
    fn from(event: KitchenEvent) -> Self {
        ServerFrame::Kitchen(event)
    }
}

/// Stable error code sent to stations.
pub fn error_code(err: &RealtimeError) -> &'static str {
    use galley_core::CoreError;
    use galley_db::DbError;

    match err {
        RealtimeError::Core(CoreError::Validation(_)) => "VALIDATION_ERROR",
        RealtimeError::Core(CoreError::CommandNotPermitted { .. }) => "NOT_PERMITTED",
        RealtimeError::Database(DbError::NotFound { .. }) => "NOT_FOUND",
        RealtimeError::Database(_) => "DATABASE_ERROR",
        RealtimeError::NotRegistered => "NOT_REGISTERED",
        RealtimeError::Unauthorized => "UNAUTHORIZED",
        RealtimeError::OriginRejected(_) => "FORBIDDEN",
        RealtimeError::InvalidMessage(_) => "INVALID_MESSAGE",
        _ => "INTERNAL_ERROR",
    }
}

/// Message safe to show a station; server-side failures stay generic.
fn client_message(err: &RealtimeError) -> String {
    if err.is_client_error() {
        err.to_string()
    } else {
        "The kitchen server could not complete the request".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_core::events::OrderRef;

    #[test]
    fn test_register_frame_wire_shape() {
        let frame = ClientFrame::from_json(r#"{"type":"register","stationId":"grill"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Register {
                station_id: "grill".to_string(),
                token: None
            }
        );

        let json = ClientFrame::Bump {
            order_id: "o-1".to_string(),
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"type":"bump","orderId":"o-1"}"#);
        assert_eq!(ClientFrame::from_json(r#"{"type":"pong"}"#).unwrap(), ClientFrame::Pong);
    }

    #[test]
    fn test_command_extraction() {
        let frame = ClientFrame::for_command(StationCommand::Urgent, "o-9");
        assert_eq!(frame.command(), Some((StationCommand::Urgent, "o-9")));
        assert_eq!(ClientFrame::Pong.command(), None);
    }

    #[test]
    fn test_server_frames_share_event_envelope() {
        let event = ServerFrame::from(KitchenEvent::OrderCompleted(OrderRef {
            order_id: "o-1".to_string(),
            order_number: "12".to_string(),
        }));
        let json = event.to_json().unwrap();
        assert!(json.starts_with(r#"{"event":"orderCompleted""#));
        assert_eq!(ServerFrame::from_json(&json).unwrap(), event);

        let heartbeat = ServerFrame::heartbeat(Utc::now());
        let json = heartbeat.to_json().unwrap();
        assert!(json.contains(r#""event":"heartbeat""#));
        let parsed = ServerFrame::from_json(&json).unwrap();
        assert!(parsed.is_heartbeat());
        assert_eq!(parsed.name(), "heartbeat");
    }

    #[test]
    fn test_unit_event_roundtrip() {
        let json = ServerFrame::from(KitchenEvent::ReportsUpdated).to_json().unwrap();
        assert_eq!(json, r#"{"event":"reportsUpdated"}"#);
        assert_eq!(
            ServerFrame::from_json(&json).unwrap(),
            ServerFrame::Kitchen(KitchenEvent::ReportsUpdated)
        );
    }

    #[test]
    fn test_error_frames_hide_server_details() {
        let frame = ServerFrame::from_error(&RealtimeError::Internal("disk on fire".into()));
        match frame {
            ServerFrame::Control(ControlFrame::Error(e)) => {
                assert_eq!(e.code, "INTERNAL_ERROR");
                assert!(!e.message.contains("disk"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let frame = ServerFrame::from_error(&RealtimeError::from(galley_db::DbError::not_found(
            "Order", "o-7",
        )));
        match frame {
            ServerFrame::Control(ControlFrame::Error(e)) => {
                assert_eq!(e.code, "NOT_FOUND");
                assert!(e.message.contains("o-7"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
