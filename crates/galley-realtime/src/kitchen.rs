//! # Kitchen Service
//!
//! Drives order intake and the station ticket state machine, then publishes
//! the resulting events. Both transports call into this service, so it never
//! knows whether a command arrived over a WebSocket or an HTTP POST.
//!
//! ## Command Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         execute(station, cmd)                           │
//! │                                                                         │
//! │  1. authorize()          prep stations may not send `urgent`          │
//! │  2. tickets().apply()    placement change + order status, one tx      │
//! │  3. for each effect:                                                   │
//! │       CompleteOrder   → Everyone: orderCompleted                       │
//! │       NotifyExpoDone  → Expo:     stationDone                          │
//! │       NotifyExpoUndo  → Expo:     stationUndo                          │
//! │       Reopen          → owners:   orderAdded (fresh fan-out)           │
//! │       FlagUrgent      → holders + Expo: orderUrgent                    │
//! │       RefreshReports  → Everyone: reportsUpdated                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Publishing happens after commit and never fails the command.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use galley_core::events::{MenuChange, OrderRef, StationMark};
use galley_core::routing::{fan_out, holding_stations};
use galley_core::ticket::{authorize, StationCommand, TicketEffect};
use galley_core::validation::validate_new_order;
use galley_core::{
    InventoryLedgerEntry, KitchenEvent, NewOrder, Order, Station, StationKind, Ticket, UnitTable,
    DEFAULT_HISTORY_LIMIT,
};
use galley_db::{CommandOutcome, Database, PlacedOrder};

use crate::backup::BackupHandle;
use crate::error::RealtimeResult;
use crate::hub::{Audience, EventPublisher};

/// The kitchen core: intake, ticket commands and catch-up reads.
pub struct KitchenService {
    db: Database,
    units: RwLock<Arc<UnitTable>>,
    publisher: Arc<dyn EventPublisher>,
    backup: Option<BackupHandle>,
}

impl KitchenService {
    /// Creates the service with the unit table currently in the database.
    pub async fn new(db: Database, publisher: Arc<dyn EventPublisher>) -> RealtimeResult<Self> {
        let units = db.catalog().load_unit_table().await?;
        Ok(KitchenService {
            db,
            units: RwLock::new(Arc::new(units)),
            publisher,
            backup: None,
        })
    }

    /// Requests a backup after every committed order.
    pub fn with_backup(mut self, handle: BackupHandle) -> Self {
        self.backup = Some(handle);
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Order Intake
    // =========================================================================

    /// Validates, persists and fans out a new order.
    pub async fn place_order(&self, new_order: &NewOrder) -> RealtimeResult<PlacedOrder> {
        validate_new_order(new_order)?;

        let units = self.units.read().await.clone();
        let placed = self.db.orders().place_order(new_order, &units).await?;

        if let Some(backup) = &self.backup {
            backup.notify();
        }

        for payload in &placed.fan_out {
            self.publisher.publish(
                Audience::Station(payload.station_id.clone()),
                KitchenEvent::OrderAdded(payload.ticket.clone()),
            );
        }
        self.publisher
            .publish(Audience::Everyone, KitchenEvent::ReportsUpdated);

        if !placed.sold_out.is_empty() {
            info!(sold_out = ?placed.sold_out, "Menu items sold out");
            self.publisher.publish(
                Audience::Everyone,
                KitchenEvent::MenuItemsUpdated(MenuChange {
                    sold_out: placed.sold_out.iter().cloned().collect(),
                }),
            );
        }

        Ok(placed)
    }

    // =========================================================================
    // Station Commands
    // =========================================================================

    /// Resolves a station id to its configured station.
    pub async fn register_station(&self, station_id: &str) -> RealtimeResult<Station> {
        let station = self.db.catalog().require_station(station_id).await?;
        debug!(station_id = %station.id, kind = station.kind.as_str(), "Station resolved");
        Ok(station)
    }

    /// Applies a command from a registered station and publishes its effects.
    pub async fn execute(
        &self,
        station: &Station,
        command: StationCommand,
        order_id: &str,
    ) -> RealtimeResult<CommandOutcome> {
        if let Err(e) = authorize(station, command) {
            warn!(station_id = %station.id, order_id = %order_id, %command, "Command refused");
            return Err(e.into());
        }

        let outcome = self.db.tickets().apply(order_id, station, command).await?;

        if outcome.transition.is_noop() {
            debug!(station_id = %station.id, order_id = %order_id, %command, "Command changed nothing");
        }

        for effect in &outcome.transition.effects {
            self.publish_effect(*effect, station, &outcome.order).await;
        }

        Ok(outcome)
    }

    pub async fn bump(&self, station_id: &str, order_id: &str) -> RealtimeResult<CommandOutcome> {
        let station = self.register_station(station_id).await?;
        self.execute(&station, StationCommand::Bump, order_id).await
    }

    pub async fn recall(&self, station_id: &str, order_id: &str) -> RealtimeResult<CommandOutcome> {
        let station = self.register_station(station_id).await?;
        self.execute(&station, StationCommand::Recall, order_id).await
    }

    pub async fn mark_urgent(
        &self,
        station_id: &str,
        order_id: &str,
    ) -> RealtimeResult<CommandOutcome> {
        let station = self.register_station(station_id).await?;
        self.execute(&station, StationCommand::Urgent, order_id).await
    }

    async fn publish_effect(&self, effect: TicketEffect, station: &Station, order: &Order) {
        let order_ref = || OrderRef {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
        };
        let mark = || StationMark {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            station_id: station.id.clone(),
        };

        match effect {
            TicketEffect::CompleteOrder => {
                self.publisher
                    .publish(Audience::Everyone, KitchenEvent::OrderCompleted(order_ref()));
            }
            TicketEffect::NotifyExpoDone => {
                self.publisher
                    .publish(Audience::Expo, KitchenEvent::StationDone(mark()));
            }
            TicketEffect::NotifyExpoUndo => {
                self.publisher
                    .publish(Audience::Expo, KitchenEvent::StationUndo(mark()));
            }
            TicketEffect::Reopen => match self.reopened_fan_out(&order.id).await {
                Ok(payloads) => {
                    for (station_id, ticket) in payloads {
                        self.publisher
                            .publish(Audience::Station(station_id), KitchenEvent::OrderAdded(ticket));
                    }
                }
                Err(e) => warn!(order_id = %order.id, error = %e, "Could not re-publish recalled order"),
            },
            TicketEffect::FlagUrgent => match self.holders(&order.id).await {
                Ok(holders) => {
                    for station_id in holders {
                        self.publisher.publish(
                            Audience::Station(station_id),
                            KitchenEvent::OrderUrgent(order_ref()),
                        );
                    }
                    self.publisher
                        .publish(Audience::Expo, KitchenEvent::OrderUrgent(order_ref()));
                }
                Err(e) => warn!(order_id = %order.id, error = %e, "Could not resolve urgent holders"),
            },
            TicketEffect::RefreshReports => {
                self.publisher
                    .publish(Audience::Everyone, KitchenEvent::ReportsUpdated);
            }
        }
    }

    /// Payloads for a recalled order, matching what catch-up would return:
    /// prep stations that already bumped are skipped and the expo ticket
    /// carries their ids.
    async fn reopened_fan_out(&self, order_id: &str) -> RealtimeResult<Vec<(String, Ticket)>> {
        let ticket = self.db.orders().ticket(order_id).await?;
        let stations = self.db.catalog().stations().await?;
        let done = self.db.tickets().done_stations(order_id).await?;

        Ok(fan_out(&ticket, &stations)
            .into_iter()
            .filter(|payload| payload.kind == StationKind::Expo || !done.contains(&payload.station_id))
            .map(|mut payload| {
                if payload.kind == StationKind::Expo {
                    payload.ticket.done_stations = done.clone();
                }
                (payload.station_id, payload.ticket)
            })
            .collect())
    }

    async fn holders(&self, order_id: &str) -> RealtimeResult<Vec<String>> {
        let ticket = self.db.orders().ticket(order_id).await?;
        let stations = self.db.catalog().stations().await?;
        Ok(holding_stations(&ticket, &stations))
    }

    // =========================================================================
    // Catch-up
    // =========================================================================

    /// Tickets still open at a station.
    pub async fn open_tickets(&self, station_id: &str) -> RealtimeResult<Vec<Ticket>> {
        let station = self.register_station(station_id).await?;
        Ok(self.db.tickets().open_tickets(&station).await?)
    }

    /// Tickets the station bumped, newest first.
    pub async fn history(&self, station_id: &str, limit: Option<i64>) -> RealtimeResult<Vec<Ticket>> {
        let station = self.register_station(station_id).await?;
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        Ok(self.db.tickets().bumped_history(&station, limit).await?)
    }

    pub async fn ledger(&self, order_id: &str) -> RealtimeResult<Vec<InventoryLedgerEntry>> {
        Ok(self.db.inventory().ledger_for_order(order_id).await?)
    }

    // =========================================================================
    // Units
    // =========================================================================

    /// Replaces the unit table with the current database contents.
    ///
    /// Orders already running keep the table they started with.
    pub async fn reload_units(&self) -> RealtimeResult<usize> {
        let fresh = self.db.catalog().load_unit_table().await?;
        let count = fresh.len();
        *self.units.write().await = Arc::new(fresh);
        info!(units = count, "Unit table reloaded");
        Ok(count)
    }

    pub async fn units(&self) -> Arc<UnitTable> {
        self.units.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::RealtimeError;
    use galley_core::units::{UnitDef, UnitKind};
    use galley_core::{CoreError, NewOrderItem, OrderStatus};
    use galley_db::{seed_demo_kitchen, DbConfig, DbError};

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<(Audience, KitchenEvent)>>,
    }

    impl RecordingPublisher {
        fn take(&self) -> Vec<(Audience, KitchenEvent)> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl EventPublisher for RecordingPublisher {
        fn publish(&self, audience: Audience, event: KitchenEvent) -> usize {
            self.events.lock().unwrap().push((audience, event));
            1
        }
    }

    async fn kitchen() -> (KitchenService, Arc<RecordingPublisher>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_demo_kitchen(&db).await.unwrap();
        let recorder = Arc::new(RecordingPublisher::default());
        let service = KitchenService::new(db, recorder.clone()).await.unwrap();
        (service, recorder)
    }

    fn order(items: Vec<NewOrderItem>) -> NewOrder {
        NewOrder {
            items,
            ..Default::default()
        }
    }

    fn names(events: &[(Audience, KitchenEvent)]) -> Vec<(String, &'static str)> {
        events
            .iter()
            .map(|(audience, event)| (audience.to_string(), event.name()))
            .collect()
    }

    #[tokio::test]
    async fn test_place_order_fans_out_per_station() {
        let (kitchen, recorder) = kitchen().await;
        let placed = kitchen
            .place_order(&order(vec![
                NewOrderItem::new("burger", 1),
                NewOrderItem::new("fries", 2),
            ]))
            .await
            .unwrap();

        let events = recorder.take();
        assert_eq!(
            names(&events),
            vec![
                ("station:fry".to_string(), "orderAdded"),
                ("station:grill".to_string(), "orderAdded"),
                ("station:expo".to_string(), "orderAdded"),
                ("everyone".to_string(), "reportsUpdated"),
            ]
        );

        match &events[1].1 {
            KitchenEvent::OrderAdded(ticket) => {
                assert_eq!(ticket.order_id, placed.order.id);
                assert_eq!(ticket.items.len(), 1);
                assert_eq!(ticket.items[0].menu_item_id, "burger");
            }
            other => panic!("unexpected {other:?}"),
        }
        match &events[2].1 {
            KitchenEvent::OrderAdded(ticket) => assert_eq!(ticket.items.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_order_rejected_before_persisting() {
        let (kitchen, recorder) = kitchen().await;

        let err = kitchen.place_order(&order(vec![])).await.unwrap_err();
        assert!(matches!(err, RealtimeError::Core(CoreError::Validation(_))));

        let err = kitchen
            .place_order(&order(vec![NewOrderItem::new("burger", 0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, RealtimeError::Core(CoreError::Validation(_))));

        assert_eq!(kitchen.db().orders().count().await.unwrap(), 0);
        assert!(recorder.take().is_empty());
    }

    #[tokio::test]
    async fn test_sold_out_broadcast() {
        let (kitchen, recorder) = kitchen().await;
        kitchen
            .place_order(&order(vec![NewOrderItem::new("special", 1)]))
            .await
            .unwrap();

        let events = recorder.take();
        let (audience, event) = events.last().unwrap();
        assert_eq!(*audience, Audience::Everyone);
        assert_eq!(
            *event,
            KitchenEvent::MenuItemsUpdated(MenuChange {
                sold_out: vec!["special".to_string()]
            })
        );

        // already at zero: no second broadcast
        kitchen
            .place_order(&order(vec![NewOrderItem::new("special", 1)]))
            .await
            .unwrap();
        assert!(recorder
            .take()
            .iter()
            .all(|(_, e)| e.name() != "menuItemsUpdated"));
    }

    #[tokio::test]
    async fn test_expo_bump_completes_once() {
        let (kitchen, recorder) = kitchen().await;
        let placed = kitchen
            .place_order(&order(vec![NewOrderItem::new("burger", 1)]))
            .await
            .unwrap();
        recorder.take();

        let outcome = kitchen.bump("expo", &placed.order.id).await.unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Completed);
        assert_eq!(
            names(&recorder.take()),
            vec![
                ("everyone".to_string(), "orderCompleted"),
                ("everyone".to_string(), "reportsUpdated"),
            ]
        );

        let again = kitchen.bump("expo", &placed.order.id).await.unwrap();
        assert!(again.transition.is_noop());
        assert!(recorder.take().is_empty());
    }

    #[tokio::test]
    async fn test_prep_bump_and_recall_notify_expo() {
        let (kitchen, recorder) = kitchen().await;
        let placed = kitchen
            .place_order(&order(vec![NewOrderItem::new("burger", 1)]))
            .await
            .unwrap();
        recorder.take();

        kitchen.bump("grill", &placed.order.id).await.unwrap();
        let events = recorder.take();
        assert_eq!(names(&events), vec![("expo".to_string(), "stationDone")]);
        match &events[0].1 {
            KitchenEvent::StationDone(mark) => assert_eq!(mark.station_id, "grill"),
            other => panic!("unexpected {other:?}"),
        }

        kitchen.recall("grill", &placed.order.id).await.unwrap();
        assert_eq!(names(&recorder.take()), vec![("expo".to_string(), "stationUndo")]);

        // recalling an open ticket changes nothing
        kitchen.recall("grill", &placed.order.id).await.unwrap();
        assert!(recorder.take().is_empty());
    }

    #[tokio::test]
    async fn test_expo_recall_reopens_order() {
        let (kitchen, recorder) = kitchen().await;
        let placed = kitchen
            .place_order(&order(vec![
                NewOrderItem::new("burger", 1),
                NewOrderItem::new("fries", 1),
            ]))
            .await
            .unwrap();
        kitchen.bump("expo", &placed.order.id).await.unwrap();
        recorder.take();

        let outcome = kitchen.recall("expo", &placed.order.id).await.unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Active);
        assert_eq!(
            names(&recorder.take()),
            vec![
                ("station:fry".to_string(), "orderAdded"),
                ("station:grill".to_string(), "orderAdded"),
                ("station:expo".to_string(), "orderAdded"),
                ("everyone".to_string(), "reportsUpdated"),
            ]
        );

        let open = kitchen.open_tickets("expo").await.unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn test_expo_recall_matches_catch_up() {
        let (kitchen, recorder) = kitchen().await;
        let placed = kitchen
            .place_order(&order(vec![
                NewOrderItem::new("burger", 1),
                NewOrderItem::new("fries", 1),
            ]))
            .await
            .unwrap();
        kitchen.bump("grill", &placed.order.id).await.unwrap();
        kitchen.bump("expo", &placed.order.id).await.unwrap();
        recorder.take();

        kitchen.recall("expo", &placed.order.id).await.unwrap();
        let events = recorder.take();
        assert_eq!(
            names(&events),
            vec![
                ("station:fry".to_string(), "orderAdded"),
                ("station:expo".to_string(), "orderAdded"),
                ("everyone".to_string(), "reportsUpdated"),
            ]
        );

        let catch_up = kitchen.open_tickets("expo").await.unwrap();
        assert_eq!(catch_up[0].done_stations, vec!["grill".to_string()]);
        match &events[1].1 {
            KitchenEvent::OrderAdded(ticket) => {
                assert_eq!(ticket.done_stations, catch_up[0].done_stations);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(kitchen.open_tickets("grill").await.unwrap().is_empty());
        assert_eq!(kitchen.open_tickets("fry").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_urgent_is_expo_only() {
        let (kitchen, recorder) = kitchen().await;
        let placed = kitchen
            .place_order(&order(vec![NewOrderItem::new("burger", 1)]))
            .await
            .unwrap();
        recorder.take();

        let err = kitchen.mark_urgent("grill", &placed.order.id).await.unwrap_err();
        assert!(matches!(err, RealtimeError::Core(CoreError::CommandNotPermitted { .. })));
        assert!(recorder.take().is_empty());

        kitchen.mark_urgent("expo", &placed.order.id).await.unwrap();
        assert_eq!(
            names(&recorder.take()),
            vec![
                ("station:grill".to_string(), "orderUrgent"),
                ("expo".to_string(), "orderUrgent"),
            ]
        );
        assert_eq!(
            kitchen.db().tickets().placement_count(&placed.order.id).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_unknown_order_and_station() {
        let (kitchen, recorder) = kitchen().await;

        let err = kitchen.bump("grill", "no-such-order").await.unwrap_err();
        assert!(matches!(err, RealtimeError::Database(DbError::NotFound { .. })));

        let err = kitchen.register_station("bar").await.unwrap_err();
        assert!(matches!(err, RealtimeError::Database(DbError::NotFound { .. })));
        assert!(recorder.take().is_empty());
    }

    #[tokio::test]
    async fn test_history_after_bumps() {
        let (kitchen, _recorder) = kitchen().await;
        for _ in 0..3 {
            let placed = kitchen
                .place_order(&order(vec![NewOrderItem::new("fries", 1)]))
                .await
                .unwrap();
            kitchen.bump("fry", &placed.order.id).await.unwrap();
        }

        assert_eq!(kitchen.history("fry", None).await.unwrap().len(), 3);
        assert_eq!(kitchen.history("fry", Some(2)).await.unwrap().len(), 2);
        assert!(kitchen.open_tickets("fry").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reload_units_picks_up_new_rows() {
        let (kitchen, _recorder) = kitchen().await;
        let before = kitchen.units().await.len();
        assert!(kitchen.units().await.convert(1.0, "scoop", "g").is_none());

        kitchen
            .db()
            .catalog()
            .upsert_unit(&UnitDef {
                name: "scoop".to_string(),
                kind: UnitKind::Weight,
                factor: 60.0,
            })
            .await
            .unwrap();

        assert_eq!(kitchen.reload_units().await.unwrap(), before + 1);
        assert_eq!(kitchen.units().await.convert(1.0, "scoop", "g"), Some(60.0));
    }

    #[tokio::test]
    async fn test_ledger_readable_per_order() {
        let (kitchen, _recorder) = kitchen().await;
        let placed = kitchen
            .place_order(&order(vec![NewOrderItem::new("fries", 1)]))
            .await
            .unwrap();
        let ledger = kitchen.ledger(&placed.order.id).await.unwrap();
        assert_eq!(ledger.len(), 2);
    }
}
