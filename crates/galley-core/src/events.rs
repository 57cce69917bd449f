//! # Kitchen Events
//!
//! Events delivered to station screens. The same JSON goes out over the
//! WebSocket and the SSE transport, so a ticket UI never needs to know which
//! one it is connected through.
//!
//! ## Wire Format
//! ```json
//! { "event": "orderAdded",     "data": { "orderId": "...", "items": [...] } }
//! { "event": "stationDone",    "data": { "orderId": "...", "stationId": "grill" } }
//! { "event": "reportsUpdated" }
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::Ticket;

/// An event fanned out to stations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
#[ts(export)]
pub enum KitchenEvent {
    /// A ticket (or this station's slice of it) to display.
    OrderAdded(Ticket),
    /// Expo finished the order; every station drops it.
    OrderCompleted(OrderRef),
    /// A prep station bumped its lines (expo strikes them through).
    StationDone(StationMark),
    /// A prep station recalled its lines.
    StationUndo(StationMark),
    /// Expo escalated the order.
    OrderUrgent(OrderRef),
    /// Reporting data changed; re-fetch.
    ReportsUpdated,
    /// Menu availability changed; re-fetch.
    MenuItemsUpdated(MenuChange),
}

/// Identifies an order in lightweight events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OrderRef {
    pub order_id: String,
    pub order_number: String,
}

/// A prep station's done marker for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StationMark {
    pub order_id: String,
    pub order_number: String,
    pub station_id: String,
}

/// Items that just went out of stock. Consumers re-fetch the menu regardless.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MenuChange {
    #[serde(default)]
    pub sold_out: Vec<String>,
}

impl KitchenEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            KitchenEvent::OrderAdded(_) => "orderAdded",
            KitchenEvent::OrderCompleted(_) => "orderCompleted",
            KitchenEvent::StationDone(_) => "stationDone",
            KitchenEvent::StationUndo(_) => "stationUndo",
            KitchenEvent::OrderUrgent(_) => "orderUrgent",
            KitchenEvent::ReportsUpdated => "reportsUpdated",
            KitchenEvent::MenuItemsUpdated(_) => "menuItemsUpdated",
        }
    }

    /// Order the event is about, if any.
    pub fn order_id(&self) -> Option<&str> {
        match self {
            KitchenEvent::OrderAdded(ticket) => Some(&ticket.order_id),
            KitchenEvent::OrderCompleted(r) | KitchenEvent::OrderUrgent(r) => Some(&r.order_id),
            KitchenEvent::StationDone(m) | KitchenEvent::StationUndo(m) => Some(&m.order_id),
            KitchenEvent::ReportsUpdated | KitchenEvent::MenuItemsUpdated(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let event = KitchenEvent::StationDone(StationMark {
            order_id: "o1".to_string(),
            order_number: "12".to_string(),
            station_id: "grill".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "stationDone");
        assert_eq!(json["data"]["stationId"], "grill");
        assert_eq!(event.name(), "stationDone");
        assert_eq!(event.order_id(), Some("o1"));
    }

    #[test]
    fn test_unit_event_has_no_data() {
        let json = serde_json::to_value(KitchenEvent::ReportsUpdated).unwrap();
        assert_eq!(json["event"], "reportsUpdated");
        assert!(json.get("data").is_none());

        let parsed: KitchenEvent = serde_json::from_str(r#"{"event":"reportsUpdated"}"#).unwrap();
        assert_eq!(parsed, KitchenEvent::ReportsUpdated);
    }

    #[test]
    fn test_menu_change_defaults_empty() {
        let parsed: KitchenEvent =
            serde_json::from_str(r#"{"event":"menuItemsUpdated","data":{}}"#).unwrap();
        assert_eq!(parsed, KitchenEvent::MenuItemsUpdated(MenuChange::default()));
    }
}
