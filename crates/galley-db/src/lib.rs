//! # galley-db: Database Layer for Galley
//!
//! SQLite persistence for the kitchen: catalog, orders, inventory deduction,
//! ticket placements and backups. Uses sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Galley Data Flow                               │
//! │                                                                         │
//! │  Kitchen service (galley-realtime)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     galley-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ CatalogRepo    │   │              │   │   │
//! │  │   │ SqlitePool    │◄───│ OrderRepo      │   │ 001_kitchen  │   │   │
//! │  │   │ VACUUM INTO   │    │ TicketRepo     │   │ 002_units    │   │   │
//! │  │   │               │    │ InventoryRepo  │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (WAL)                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation, configuration and backups
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//! - [`fixtures`] - Demo kitchen data
//!
//! ## Usage
//!
//! ```rust,ignore
//! use galley_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("kitchen.db")).await?;
//! let units = db.catalog().load_unit_table().await?;
//! let placed = db.orders().place_order(&new_order, &units).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod fixtures;
pub mod migrations;
pub mod pool;
pub mod repository;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use fixtures::seed_demo_kitchen;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::inventory::InventoryRepository;
pub use repository::order::{OrderRepository, PlacedOrder};
pub use repository::ticket::{CommandOutcome, TicketRepository};
