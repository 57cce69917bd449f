//! # Repository Module
//!
//! Database repository implementations for the kitchen.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Kitchen service                                                        │
//! │       │                                                                 │
//! │       │  db.orders().place_order(&new_order, &units)                    │
//! │       ▼                                                                 │
//! │  OrderRepository ──► inventory::deduct ──► ticket::load_ticket          │
//! │       │                                                                 │
//! │       │  SQL, one transaction                                           │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Stations, menu, recipes, units
//! - [`OrderRepository`](order::OrderRepository) - Order intake transaction
//! - [`TicketRepository`](ticket::TicketRepository) - Placements and catch-up
//! - [`InventoryRepository`](inventory::InventoryRepository) - Stock levels and ledger

pub mod catalog;
pub mod inventory;
pub mod order;
pub mod ticket;
