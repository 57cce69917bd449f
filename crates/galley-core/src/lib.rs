//! # galley-core: Pure Kitchen Domain Logic
//!
//! This crate holds every rule of the kitchen display that can be expressed
//! without touching a database or a socket.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Galley Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          POS terminals / Station screens (HTTP, WS, SSE)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             galley-realtime (hub, adapters, kitchen)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ galley-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   units   │  │ deduction │  │  routing  │  │  ticket   │  │   │
//! │  │   │ UnitTable │  │ plan_line │  │  fan_out  │  │ bump/     │  │   │
//! │  │   │ convert   │  │ stock     │  │           │  │ recall    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    galley-db (Database Layer)                   │   │
//! │  │          SQLite transactions, deduction engine, catch-up        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Order, MenuItem, Station, Ticket, ...)
//! - [`units`] - Unit conversion table
//! - [`deduction`] - Inventory deduction planning pipeline
//! - [`routing`] - Per-station fan-out grouping
//! - [`ticket`] - Station ticket state machine
//! - [`events`] - Kitchen events delivered to stations
//! - [`validation`] - Order intake validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use galley_core::units::UnitTable;
//!
//! let units = UnitTable::standard();
//!
//! // 2 kg expressed in grams
//! assert_eq!(units.convert(2.0, "kg", "g"), Some(2000.0));
//!
//! // Weight and volume never mix
//! assert_eq!(units.convert(1.0, "kg", "ml"), None);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod deduction;
pub mod error;
pub mod events;
pub mod routing;
pub mod ticket;
pub mod types;
pub mod units;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, UnitError, ValidationError};
pub use events::KitchenEvent;
pub use types::*;
pub use units::UnitTable;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of lines accepted on a single order.
pub const MAX_ORDER_LINES: usize = 100;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum length of free-text special instructions.
pub const MAX_INSTRUCTIONS_LEN: usize = 500;

/// Maximum length of a human ticket number.
pub const MAX_ORDER_NUMBER_LEN: usize = 32;

/// Default number of tickets returned by the bumped-history query.
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
