//! # galley-realtime: Station Fan-out for Galley
//!
//! Moves kitchen events from committed transactions to station screens, and
//! station commands back into the ticket state machine.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Realtime Architecture                             │
//! │                                                                         │
//! │  POST /orders ──► KitchenService ──► galley-db (one transaction)       │
//! │                        │                                                │
//! │                        │ publish(audience, event)   after commit        │
//! │                        ▼                                                │
//! │                 ┌──────────────┐                                        │
//! │                 │  StationHub  │  subscribers, heartbeats, reaping      │
//! │                 └──────┬───────┘                                        │
//! │              ┌─────────┴─────────┐                                      │
//! │              ▼                   ▼                                      │
//! │        ┌──────────┐        ┌──────────┐                                 │
//! │        │ GET /ws  │        │GET /events│   HTTP POST commands           │
//! │        │ (ws.rs)  │        │ (sse.rs) │◄── /stations/{id}/tickets/..    │
//! │        └────┬─────┘        └────┬─────┘                                 │
//! │             └─────────┬─────────┘                                       │
//! │                       ▼                                                 │
//! │               StationClient (client.rs)                                 │
//! │               WS first, SSE fallback, snapshot on every reconnect       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`kitchen`] - `KitchenService`: intake, commands, catch-up, unit reload
//! - [`hub`] - `StationHub` and the `EventPublisher` trait
//! - [`protocol`] - Frames exchanged with stations
//! - [`server`] - Station routes and shared state
//! - [`client`] - Reconnecting station client
//! - [`backup`] - Debounced opportunistic backups
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Realtime error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use galley_realtime::{router, KitchenService, RealtimeConfig, RealtimeState, StationHub};
//!
//! let config = RealtimeConfig::load(None)?;
//! let hub = StationHub::new(&config.hub);
//! let kitchen = KitchenService::new(db, Arc::new(hub.clone())).await?;
//! let _heartbeat = hub.spawn_heartbeat();
//!
//! let app = router(RealtimeState::new(Arc::new(kitchen), hub, config.auth));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backup;
pub mod client;
pub mod config;
pub mod error;
pub mod hub;
pub mod kitchen;
pub mod protocol;
pub mod server;

mod sse;
mod ws;

// =============================================================================
// Re-exports
// =============================================================================

pub use backup::{BackupHandle, BackupScheduler};
pub use client::{ClientEvent, ClientHandle, ConnectionState, StationClient, StationClientConfig};
pub use config::{AuthSettings, BackupSettings, ClientSettings, HubSettings, RealtimeConfig};
pub use error::{RealtimeError, RealtimeResult};
pub use hub::{Audience, EventPublisher, StationHub, Subscription, TransportKind};
pub use kitchen::KitchenService;
pub use protocol::{ClientFrame, ServerFrame};
pub use server::{bearer_token, router, status_code, RealtimeState};
