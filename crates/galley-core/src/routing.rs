//! # Station Routing
//!
//! Splits a ticket into the payloads each station receives.
//!
//! ```text
//!   Ticket #42 (dine-in)                 grill  ← [Burger ×2]
//!   ├─ Burger ×2   (grill)     fan_out   fry    ← [Fries ×1]
//!   ├─ Fries ×1    (fry)      ────────►  expo   ← [Burger ×2, Fries ×1, Shake ×1]
//!   └─ Shake ×1    (bar)                 bar    ← [Shake ×1]
//! ```
//!
//! Prep stations get only their own lines. Every expo station gets the whole
//! ticket. A station whose order-type filter excludes the order gets nothing.

use crate::types::{Station, StationKind, StationTicket, Ticket};

/// Per-station payloads for a ticket, prep stations first then expo.
pub fn fan_out(ticket: &Ticket, stations: &[Station]) -> Vec<StationTicket> {
    let order_type = ticket.order_type;

    let prep = stations
        .iter()
        .filter(|station| station.kind == StationKind::Prep && station.accepts(order_type))
        .filter_map(|station| {
            let slice = ticket.for_station(&station.id);
            (!slice.items.is_empty()).then(|| StationTicket {
                station_id: station.id.clone(),
                kind: StationKind::Prep,
                ticket: slice,
            })
        });

    let expo = stations
        .iter()
        .filter(|station| station.is_expo() && station.accepts(order_type))
        .map(|station| StationTicket {
            station_id: station.id.clone(),
            kind: StationKind::Expo,
            ticket: ticket.clone(),
        });

    prep.chain(expo).collect()
}

/// Prep stations that hold at least one line of the ticket.
pub fn holding_stations(ticket: &Ticket, stations: &[Station]) -> Vec<String> {
    fan_out(ticket, stations)
        .into_iter()
        .filter(|t| t.kind == StationKind::Prep)
        .map(|t| t.station_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderType, TicketItem};
    use chrono::Utc;

    fn station(id: &str, kind: StationKind, filter: Option<OrderType>) -> Station {
        Station {
            id: id.to_string(),
            name: id.to_uppercase(),
            kind,
            order_type_filter: filter,
        }
    }

    fn line(id: &str, station: &str) -> TicketItem {
        TicketItem {
            item_id: id.to_string(),
            menu_item_id: id.to_string(),
            name: id.to_string(),
            quantity: 1,
            station_id: station.to_string(),
            modifiers: vec![],
            special_instructions: None,
            allergy: false,
        }
    }

    fn ticket(order_type: OrderType) -> Ticket {
        Ticket {
            order_id: "o1".to_string(),
            order_number: "42".to_string(),
            order_type,
            special_instructions: None,
            allergy: true,
            created_at: Utc::now(),
            items: vec![line("burger", "grill"), line("fries", "fry"), line("shake", "bar")],
            done_stations: vec![],
            bumped_at: None,
        }
    }

    fn kitchen() -> Vec<Station> {
        vec![
            station("grill", StationKind::Prep, None),
            station("fry", StationKind::Prep, None),
            station("bar", StationKind::Prep, Some(OrderType::DineIn)),
            station("salad", StationKind::Prep, None),
            station("expo", StationKind::Expo, None),
        ]
    }

    #[test]
    fn test_fan_out_groups_by_station() {
        let out = fan_out(&ticket(OrderType::DineIn), &kitchen());
        let ids: Vec<&str> = out.iter().map(|t| t.station_id.as_str()).collect();
        assert_eq!(ids, vec!["grill", "fry", "bar", "expo"]);

        let grill = &out[0];
        assert_eq!(grill.ticket.items.len(), 1);
        assert_eq!(grill.ticket.items[0].item_id, "burger");
        assert!(grill.ticket.allergy);

        let expo = out.last().unwrap();
        assert_eq!(expo.kind, StationKind::Expo);
        assert_eq!(expo.ticket.items.len(), 3);
    }

    #[test]
    fn test_station_without_items_gets_nothing() {
        let out = fan_out(&ticket(OrderType::DineIn), &kitchen());
        assert!(out.iter().all(|t| t.station_id != "salad"));
    }

    #[test]
    fn test_order_type_filter() {
        let out = fan_out(&ticket(OrderType::ToGo), &kitchen());
        assert!(out.iter().all(|t| t.station_id != "bar"));
        assert_eq!(
            holding_stations(&ticket(OrderType::ToGo), &kitchen()),
            vec!["grill", "fry"]
        );
    }

    #[test]
    fn test_every_expo_gets_aggregate() {
        let mut stations = kitchen();
        stations.push(station("expo-2", StationKind::Expo, None));
        let out = fan_out(&ticket(OrderType::DineIn), &stations);
        let expos: Vec<_> = out.iter().filter(|t| t.kind == StationKind::Expo).collect();
        assert_eq!(expos.len(), 2);
        assert!(expos.iter().all(|t| t.ticket.items.len() == 3));
    }
}
