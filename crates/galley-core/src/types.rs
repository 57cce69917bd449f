//! # Domain Types
//!
//! Core domain types used throughout Galley.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Order       │   │   OrderItem     │   │    MenuItem     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │──►│  order_id (FK)  │──►│  station_id     │       │
//! │  │  order_number   │   │  quantity       │   │  stock (null =  │       │
//! │  │  order_type     │   │  modifier_ids   │   │   unlimited)    │       │
//! │  │  status         │   └─────────────────┘   └────────┬────────┘       │
//! │  └─────────────────┘                                  │ RecipeLine     │
//! │                                                       ▼                │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Station      │   │    Modifier     │   │   Ingredient    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  kind: prep |   │   │  ingredient_id  │──►│  unit           │       │
//! │  │        expo     │   │  replaces_      │──►│  quantity       │       │
//! │  │  order filter   │   │   ingredient_id │   │  cost_cents     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Orders have:
//! - `id`: UUID v4 - immutable, used for database relations and wire events
//! - `order_number`: human-readable ticket number shown on the station screen

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Order Status
// =============================================================================

/// Lifecycle of an order as a whole.
///
/// Only the expo station moves an order between these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Still being worked on by at least one station.
    Active,
    /// Bumped by expo.
    Completed,
}

// =============================================================================
// Order Type
// =============================================================================

/// How the guest receives the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "kebab-case"))]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum OrderType {
    #[default]
    DineIn,
    ToGo,
    Catering,
    Delivery,
}

impl OrderType {
    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::DineIn => "dine-in",
            OrderType::ToGo => "to-go",
            OrderType::Catering => "catering",
            OrderType::Delivery => "delivery",
        }
    }
}

// =============================================================================
// Station
// =============================================================================

/// Whether a station prepares food or finalizes orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StationKind {
    Prep,
    Expo,
}

impl StationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationKind::Prep => "prep",
            StationKind::Expo => "expo",
        }
    }
}

/// A physical kitchen station with its own display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub kind: StationKind,
    /// When set, the station only ever sees orders of this type.
    pub order_type_filter: Option<OrderType>,
}

impl Station {
    /// Returns true if this station should see orders of `order_type`.
    pub fn accepts(&self, order_type: OrderType) -> bool {
        self.order_type_filter.map_or(true, |only| only == order_type)
    }

    #[inline]
    pub fn is_expo(&self) -> bool {
        self.kind == StationKind::Expo
    }
}

// =============================================================================
// Menu & Inventory
// =============================================================================

/// A sellable dish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    /// Price in cents (smallest currency unit).
    pub price_cents: i64,
    /// Station that prepares this item.
    pub station_id: String,
    /// Portions left. `None` means unlimited.
    pub stock: Option<i64>,
    /// False once the item is 86'd.
    pub available: bool,
}

/// A raw ingredient tracked in its storage unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    /// Storage unit; every deduction is converted into it.
    pub unit: String,
    pub quantity: f64,
    pub cost_cents: i64,
}

/// An option chosen on an order line.
///
/// ## Examples
/// - "Extra Bacon": `ingredient_id = bacon`, no replacement
/// - "No Cheese": no ingredient, `replaces_ingredient_id = cheese`
/// - "Gluten-free bun": `ingredient_id = gf_bun`, `replaces_ingredient_id = bun`
/// - "Well done": neither (pure add-on, no inventory effect)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Modifier {
    pub id: String,
    pub name: String,
    pub ingredient_id: Option<String>,
    pub replaces_ingredient_id: Option<String>,
}

/// One ingredient of a menu item's recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RecipeLine {
    pub menu_item_id: String,
    pub ingredient_id: String,
    /// Amount per portion, in `unit`.
    pub amount: f64,
    /// Declared unit. Older recipes may omit it.
    pub unit: Option<String>,
}

/// One recorded decrement of an ingredient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InventoryLedgerEntry {
    pub id: String,
    pub order_id: String,
    pub menu_item_id: String,
    pub ingredient_id: String,
    /// Set when the decrement came from a modifier rather than the recipe.
    pub modifier_id: Option<String>,
    /// Amount in the ingredient's storage unit.
    pub amount: f64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Orders
// =============================================================================

/// A persisted order header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub order_type: OrderType,
    pub special_instructions: Option<String>,
    pub allergy: bool,
    pub status: OrderStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Order as submitted by the point of sale.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewOrder {
    /// Human ticket number. Generated from the daily sequence when absent.
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub order_type: Option<OrderType>,
    pub items: Vec<NewOrderItem>,
    #[serde(default)]
    pub special_instructions: Option<String>,
    #[serde(default)]
    pub allergy: bool,
}

/// One line of a submitted order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewOrderItem {
    pub menu_item_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub modifier_ids: Vec<String>,
    #[serde(default)]
    pub special_instructions: Option<String>,
    #[serde(default)]
    pub allergy: bool,
}

impl NewOrderItem {
    /// Convenience constructor for a plain line without modifiers.
    pub fn new(menu_item_id: impl Into<String>, quantity: i64) -> Self {
        Self {
            menu_item_id: menu_item_id.into(),
            quantity,
            modifier_ids: Vec::new(),
            special_instructions: None,
            allergy: false,
        }
    }

    pub fn with_modifier(mut self, modifier_id: impl Into<String>) -> Self {
        self.modifier_ids.push(modifier_id.into());
        self
    }
}

// =============================================================================
// Tickets
// =============================================================================

/// The kitchen-facing view of an order (or of its items at one station).
///
/// This is the payload of `orderAdded` and the row type of the catch-up
/// queries, so a reconnecting station renders exactly what it would have
/// received live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Ticket {
    pub order_id: String,
    pub order_number: String,
    pub order_type: OrderType,
    pub special_instructions: Option<String>,
    pub allergy: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub items: Vec<TicketItem>,
    /// Prep stations that already bumped this order (expo view only).
    #[serde(default)]
    pub done_stations: Vec<String>,
    /// When the viewing station bumped it (history view only).
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub bumped_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Distinct stations owning at least one item, in first-seen order.
    pub fn owning_stations(&self) -> Vec<String> {
        let mut stations: Vec<String> = Vec::new();
        for item in &self.items {
            if !stations.contains(&item.station_id) {
                stations.push(item.station_id.clone());
            }
        }
        stations
    }

    /// Copy of this ticket restricted to one station's items.
    pub fn for_station(&self, station_id: &str) -> Ticket {
        Ticket {
            items: self
                .items
                .iter()
                .filter(|item| item.station_id == station_id)
                .cloned()
                .collect(),
            done_stations: Vec::new(),
            ..self.clone()
        }
    }
}

/// One line as shown on a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TicketItem {
    /// OrderItem id.
    pub item_id: String,
    pub menu_item_id: String,
    pub name: String,
    pub quantity: i64,
    pub station_id: String,
    /// Names of the chosen modifiers.
    pub modifiers: Vec<String>,
    pub special_instructions: Option<String>,
    pub allergy: bool,
}

/// A ticket addressed to one station.
#[derive(Debug, Clone, PartialEq)]
pub struct StationTicket {
    pub station_id: String,
    pub kind: StationKind,
    pub ticket: Ticket,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, station: &str) -> TicketItem {
        TicketItem {
            item_id: id.to_string(),
            menu_item_id: format!("menu-{id}"),
            name: id.to_string(),
            quantity: 1,
            station_id: station.to_string(),
            modifiers: vec![],
            special_instructions: None,
            allergy: false,
        }
    }

    fn ticket(items: Vec<TicketItem>) -> Ticket {
        Ticket {
            order_id: "order-1".to_string(),
            order_number: "7".to_string(),
            order_type: OrderType::DineIn,
            special_instructions: None,
            allergy: false,
            created_at: Utc::now(),
            items,
            done_stations: vec![],
            bumped_at: None,
        }
    }

    #[test]
    fn test_station_filter() {
        let mut station = Station {
            id: "fry".to_string(),
            name: "Fry".to_string(),
            kind: StationKind::Prep,
            order_type_filter: None,
        };
        assert!(station.accepts(OrderType::Catering));

        station.order_type_filter = Some(OrderType::ToGo);
        assert!(station.accepts(OrderType::ToGo));
        assert!(!station.accepts(OrderType::DineIn));
    }

    #[test]
    fn test_owning_stations_deduplicates_in_order() {
        let t = ticket(vec![item("a", "grill"), item("b", "fry"), item("c", "grill")]);
        assert_eq!(t.owning_stations(), vec!["grill", "fry"]);
    }

    #[test]
    fn test_for_station_keeps_only_that_station() {
        let t = ticket(vec![item("a", "grill"), item("b", "fry")]);
        let grill = t.for_station("grill");
        assert_eq!(grill.items.len(), 1);
        assert_eq!(grill.items[0].item_id, "a");
        assert_eq!(grill.order_id, t.order_id);
    }

    #[test]
    fn test_order_type_wire_names() {
        assert_eq!(serde_json::to_string(&OrderType::ToGo).unwrap(), "\"to-go\"");
        let parsed: OrderType = serde_json::from_str("\"dine-in\"").unwrap();
        assert_eq!(parsed, OrderType::DineIn);
        assert_eq!(OrderType::Catering.as_str(), "catering");
    }

    #[test]
    fn test_new_order_defaults() {
        let order: NewOrder =
            serde_json::from_str(r#"{"items":[{"menuItemId":"burger","quantity":2}]}"#).unwrap();
        assert!(order.order_number.is_none());
        assert!(order.order_type.is_none());
        assert!(!order.allergy);
        assert!(order.items[0].modifier_ids.is_empty());
    }
}
