//! # Station Ticket State Machine
//!
//! Lifecycle of one order at one station.
//!
//! ## States & Transitions
//! ```text
//!                       bump
//!          ┌──────┐  ─────────►  ┌─────────────────┐
//!          │ Open │              │ Bumped { at }   │ ── bump ──┐ (refresh `at`,
//!          └──────┘  ◄─────────  └─────────────────┘ ◄────────┘  no events)
//!                       recall
//!
//!  Storage: Open = no ticket_placements row, Bumped = row with bumped_at.
//! ```
//!
//! ## Effects by Station Kind
//! | Command | Prior  | Prep station       | Expo station                          |
//! |---------|--------|--------------------|---------------------------------------|
//! | bump    | Open   | stationDone → expo | order completed, orderCompleted → all |
//! | bump    | Bumped | (nothing)          | (nothing)                             |
//! | recall  | Bumped | stationUndo → expo | order active, orderAdded → owners     |
//! | recall  | Open   | (nothing)          | (nothing)                             |
//! | urgent  | any    | refused            | orderUrgent → holders + expo          |
//!
//! Expo bump and recall also invalidate reports.
//!
//! The functions here only decide. The kitchen service applies the placement
//! change and the order status inside one transaction, then publishes effects.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::{OrderStatus, Station, StationKind};

// =============================================================================
// Ticket State
// =============================================================================

/// State of an order at one station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    Open,
    Bumped { at: DateTime<Utc> },
}

impl TicketState {
    /// Maps the optional `bumped_at` of a placement row.
    pub fn from_placement(bumped_at: Option<DateTime<Utc>>) -> Self {
        match bumped_at {
            Some(at) => TicketState::Bumped { at },
            None => TicketState::Open,
        }
    }

    #[inline]
    pub fn is_bumped(&self) -> bool {
        matches!(self, TicketState::Bumped { .. })
    }
}

// =============================================================================
// Commands
// =============================================================================

/// A command a station issues against one of its tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum StationCommand {
    Bump,
    Recall,
    Urgent,
}

impl StationCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationCommand::Bump => "bump",
            StationCommand::Recall => "recall",
            StationCommand::Urgent => "urgent",
        }
    }

    /// How the command touches the placement row.
    pub fn placement_change(&self) -> PlacementChange {
        match self {
            StationCommand::Bump => PlacementChange::Upsert,
            StationCommand::Recall => PlacementChange::Delete,
            StationCommand::Urgent => PlacementChange::Keep,
        }
    }
}

impl fmt::Display for StationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write applied to `ticket_placements` for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementChange {
    /// Insert, or refresh the timestamp of, the (order, station) row.
    Upsert,
    /// Remove the (order, station) row.
    Delete,
    Keep,
}

// =============================================================================
// Transitions
// =============================================================================

/// Something to tell the stations after a transition commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketEffect {
    /// `orderCompleted` to every station.
    CompleteOrder,
    /// `stationDone` to expo.
    NotifyExpoDone,
    /// `stationUndo` to expo.
    NotifyExpoUndo,
    /// `orderAdded` again to every owning prep station and expo.
    Reopen,
    /// `orderUrgent` to holding stations and expo.
    FlagUrgent,
    /// `reportsUpdated` to every station.
    RefreshReports,
}

/// Outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transition {
    /// New order status to persist alongside the placement change.
    pub order_status: Option<OrderStatus>,
    pub effects: Vec<TicketEffect>,
}

impl Transition {
    fn none() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_noop(&self) -> bool {
        self.order_status.is_none() && self.effects.is_empty()
    }
}

/// Rejects commands a station's kind may not issue.
pub fn authorize(station: &Station, command: StationCommand) -> CoreResult<()> {
    if command == StationCommand::Urgent && station.kind != StationKind::Expo {
        return Err(CoreError::CommandNotPermitted {
            station_id: station.id.clone(),
            kind: station.kind.as_str().to_string(),
            command: command.to_string(),
        });
    }
    Ok(())
}

/// Decides the order status change and effects of a command.
///
/// `prior` is the station's state before the placement change was applied.
pub fn transition(kind: StationKind, command: StationCommand, prior: TicketState) -> Transition {
    use StationCommand::*;
    use TicketEffect::*;

    match (command, prior.is_bumped(), kind) {
        (Bump, false, StationKind::Expo) => Transition {
            order_status: Some(OrderStatus::Completed),
            effects: vec![CompleteOrder, RefreshReports],
        },
        (Bump, false, StationKind::Prep) => Transition {
            order_status: None,
            effects: vec![NotifyExpoDone],
        },
        (Recall, true, StationKind::Expo) => Transition {
            order_status: Some(OrderStatus::Active),
            effects: vec![Reopen, RefreshReports],
        },
        (Recall, true, StationKind::Prep) => Transition {
            order_status: None,
            effects: vec![NotifyExpoUndo],
        },
        (Urgent, _, StationKind::Expo) => Transition {
            order_status: None,
            effects: vec![FlagUrgent],
        },
        _ => Transition::none(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bumped() -> TicketState {
        TicketState::Bumped { at: Utc::now() }
    }

    fn station(kind: StationKind) -> Station {
        Station {
            id: "s1".to_string(),
            name: "S1".to_string(),
            kind,
            order_type_filter: None,
        }
    }

    #[test]
    fn test_from_placement() {
        assert_eq!(TicketState::from_placement(None), TicketState::Open);
        assert!(TicketState::from_placement(Some(Utc::now())).is_bumped());
    }

    #[test]
    fn test_expo_bump_completes_order() {
        let t = transition(StationKind::Expo, StationCommand::Bump, TicketState::Open);
        assert_eq!(t.order_status, Some(OrderStatus::Completed));
        assert_eq!(
            t.effects,
            vec![TicketEffect::CompleteOrder, TicketEffect::RefreshReports]
        );
    }

    #[test]
    fn test_repeated_bump_fires_nothing() {
        for kind in [StationKind::Expo, StationKind::Prep] {
            assert!(transition(kind, StationCommand::Bump, bumped()).is_noop());
        }
    }

    #[test]
    fn test_prep_bump_notifies_expo_only() {
        let t = transition(StationKind::Prep, StationCommand::Bump, TicketState::Open);
        assert_eq!(t.order_status, None);
        assert_eq!(t.effects, vec![TicketEffect::NotifyExpoDone]);
    }

    #[test]
    fn test_expo_recall_reopens() {
        let t = transition(StationKind::Expo, StationCommand::Recall, bumped());
        assert_eq!(t.order_status, Some(OrderStatus::Active));
        assert!(t.effects.contains(&TicketEffect::Reopen));
    }

    #[test]
    fn test_prep_recall_undoes() {
        let t = transition(StationKind::Prep, StationCommand::Recall, bumped());
        assert_eq!(t.effects, vec![TicketEffect::NotifyExpoUndo]);
    }

    #[test]
    fn test_recall_of_open_ticket_is_noop() {
        assert!(transition(StationKind::Expo, StationCommand::Recall, TicketState::Open).is_noop());
        assert!(transition(StationKind::Prep, StationCommand::Recall, TicketState::Open).is_noop());
    }

    #[test]
    fn test_urgent_is_expo_only() {
        assert!(authorize(&station(StationKind::Expo), StationCommand::Urgent).is_ok());
        assert!(matches!(
            authorize(&station(StationKind::Prep), StationCommand::Urgent),
            Err(CoreError::CommandNotPermitted { .. })
        ));
        assert!(authorize(&station(StationKind::Prep), StationCommand::Bump).is_ok());

        let t = transition(StationKind::Expo, StationCommand::Urgent, TicketState::Open);
        assert_eq!(t.effects, vec![TicketEffect::FlagUrgent]);
        assert_eq!(StationCommand::Urgent.placement_change(), PlacementChange::Keep);
    }
}
