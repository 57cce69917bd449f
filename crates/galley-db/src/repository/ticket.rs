//! # Ticket Repository
//!
//! Ticket placements (the persisted half of the station state machine) and
//! the catch-up queries stations run on every (re)connect.
//!
//! ## Placement Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  bump    INSERT OR IGNORE placement    1 row → prior Open              │
//! │                                        0 rows → prior Bumped, refresh  │
//! │  recall  DELETE ... RETURNING bumped_at  row → prior Bumped            │
//! │                                          none → prior Open             │
//! │  urgent  read only                                                     │
//! │                                                                         │
//! │  then: transition(kind, command, prior) → order status update          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! The placement write is the first statement of the transaction, so the
//! prior state it reports cannot change before commit.
//!
//! ## Catch-up
//! Only orders, items and placements are consulted, never in-memory
//! subscriber state, so a reconnecting station sees exactly what the database
//! says is open.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::order::fetch_order;
use galley_core::ticket::{transition, PlacementChange, StationCommand, TicketState, Transition};
use galley_core::{Order, OrderStatus, Station, StationKind, Ticket, TicketItem};

/// What a command did to the database.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Order header after the command.
    pub order: Order,
    pub prior: TicketState,
    pub transition: Transition,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    item_id: String,
    menu_item_id: String,
    name: String,
    quantity: i64,
    station_id: String,
    special_instructions: Option<String>,
    allergy: bool,
}

#[derive(sqlx::FromRow)]
struct ModifierNameRow {
    order_item_id: String,
    name: String,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    #[sqlx(flatten)]
    order: Order,
    bumped_at: DateTime<Utc>,
}

/// Repository for ticket placements.
#[derive(Debug, Clone)]
pub struct TicketRepository {
    pool: SqlitePool,
}

impl TicketRepository {
    /// Creates a new TicketRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TicketRepository { pool }
    }

    /// Applies a station command to its placement row and the order status.
    ///
    /// Returns `NotFound` if the order does not exist.
    pub async fn apply(
        &self,
        order_id: &str,
        station: &Station,
        command: StationCommand,
    ) -> DbResult<CommandOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let prior = match command.placement_change() {
            PlacementChange::Upsert => {
                let inserted = sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO ticket_placements (order_id, station_id, bumped_at)
                    VALUES (?1, ?2, ?3)
                    "#,
                )
                .bind(order_id)
                .bind(&station.id)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| match DbError::from(e) {
                    DbError::ForeignKeyViolation { .. } => DbError::not_found("Order", order_id),
                    other => other,
                })?;

                if inserted.rows_affected() == 1 {
                    TicketState::Open
                } else {
                    let previous: DateTime<Utc> = sqlx::query_scalar(
                        "SELECT bumped_at FROM ticket_placements WHERE order_id = ?1 AND station_id = ?2",
                    )
                    .bind(order_id)
                    .bind(&station.id)
                    .fetch_one(&mut *tx)
                    .await?;

                    sqlx::query(
                        "UPDATE ticket_placements SET bumped_at = ?3 WHERE order_id = ?1 AND station_id = ?2",
                    )
                    .bind(order_id)
                    .bind(&station.id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;

                    TicketState::Bumped { at: previous }
                }
            }
            PlacementChange::Delete => {
                let removed: Option<DateTime<Utc>> = sqlx::query_scalar(
                    r#"
                    DELETE FROM ticket_placements
                    WHERE order_id = ?1 AND station_id = ?2
                    RETURNING bumped_at
                    "#,
                )
                .bind(order_id)
                .bind(&station.id)
                .fetch_optional(&mut *tx)
                .await?;
                TicketState::from_placement(removed)
            }
            PlacementChange::Keep => {
                let current: Option<DateTime<Utc>> = sqlx::query_scalar(
                    "SELECT bumped_at FROM ticket_placements WHERE order_id = ?1 AND station_id = ?2",
                )
                .bind(order_id)
                .bind(&station.id)
                .fetch_optional(&mut *tx)
                .await?;
                TicketState::from_placement(current)
            }
        };

        let plan = transition(station.kind, command, prior);

        if let Some(status) = plan.order_status {
            let completed_at = (status == OrderStatus::Completed).then_some(now);
            sqlx::query("UPDATE orders SET status = ?2, completed_at = ?3 WHERE id = ?1")
                .bind(order_id)
                .bind(status)
                .bind(completed_at)
                .execute(&mut *tx)
                .await?;
        }

        let order = fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        tx.commit().await?;

        debug!(
            order_id = %order_id,
            station_id = %station.id,
            %command,
            was_bumped = prior.is_bumped(),
            effects = plan.effects.len(),
            "Station command applied"
        );

        Ok(CommandOutcome {
            order,
            prior,
            transition: plan,
        })
    }

    /// Current state of an order at a station.
    pub async fn state(&self, order_id: &str, station_id: &str) -> DbResult<TicketState> {
        let bumped_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT bumped_at FROM ticket_placements WHERE order_id = ?1 AND station_id = ?2",
        )
        .bind(order_id)
        .bind(station_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(TicketState::from_placement(bumped_at))
    }

    /// Prep stations that already bumped the order, by id.
    pub async fn done_stations(&self, order_id: &str) -> DbResult<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        done_prep_stations(&mut conn, order_id).await
    }

    /// Number of placement rows for an order.
    pub async fn placement_count(&self, order_id: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ticket_placements WHERE order_id = ?1")
                .bind(order_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    // =========================================================================
    // Catch-up queries
    // =========================================================================

    /// Tickets the station still has to work, oldest first.
    ///
    /// Prep stations see active orders holding at least one of their items,
    /// restricted to those items, unless they already bumped them. Expo sees
    /// every active order it has not bumped, with the prep stations already
    /// done.
    pub async fn open_tickets(&self, station: &Station) -> DbResult<Vec<Ticket>> {
        let filter = station.order_type_filter;
        let mut conn = self.pool.acquire().await?;

        let orders = match station.kind {
            StationKind::Prep => {
                sqlx::query_as::<_, Order>(
                    r#"
                    SELECT o.id, o.order_number, o.order_type, o.special_instructions, o.allergy,
                           o.status, o.created_at, o.completed_at
                    FROM orders o
                    WHERE o.status = 'active'
                      AND (?2 IS NULL OR o.order_type = ?2)
                      AND EXISTS (
                          SELECT 1 FROM order_items oi
                          JOIN menu_items mi ON mi.id = oi.menu_item_id
                          WHERE oi.order_id = o.id AND mi.station_id = ?1
                      )
                      AND NOT EXISTS (
                          SELECT 1 FROM ticket_placements tp
                          WHERE tp.order_id = o.id AND tp.station_id = ?1
                      )
                    ORDER BY o.created_at, o.rowid
                    "#,
                )
                .bind(&station.id)
                .bind(filter)
                .fetch_all(&mut *conn)
                .await?
            }
            StationKind::Expo => {
                sqlx::query_as::<_, Order>(
                    r#"
                    SELECT o.id, o.order_number, o.order_type, o.special_instructions, o.allergy,
                           o.status, o.created_at, o.completed_at
                    FROM orders o
                    WHERE o.status = 'active'
                      AND (?2 IS NULL OR o.order_type = ?2)
                      AND NOT EXISTS (
                          SELECT 1 FROM ticket_placements tp
                          WHERE tp.order_id = o.id AND tp.station_id = ?1
                      )
                    ORDER BY o.created_at, o.rowid
                    "#,
                )
                .bind(&station.id)
                .bind(filter)
                .fetch_all(&mut *conn)
                .await?
            }
        };

        let mut tickets = Vec::with_capacity(orders.len());
        for order in &orders {
            tickets.push(station_view(&mut conn, station, order, None).await?);
        }

        debug!(station_id = %station.id, open = tickets.len(), "Open tickets loaded");
        Ok(tickets)
    }

    /// Tickets the station bumped, most recent first.
    pub async fn bumped_history(&self, station: &Station, limit: i64) -> DbResult<Vec<Ticket>> {
        let mut conn = self.pool.acquire().await?;

        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT o.id, o.order_number, o.order_type, o.special_instructions, o.allergy,
                   o.status, o.created_at, o.completed_at, tp.bumped_at
            FROM ticket_placements tp
            JOIN orders o ON o.id = tp.order_id
            WHERE tp.station_id = ?1
            ORDER BY tp.bumped_at DESC, o.rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(&station.id)
        .bind(limit.max(0))
        .fetch_all(&mut *conn)
        .await?;

        let mut tickets = Vec::with_capacity(rows.len());
        for row in &rows {
            tickets.push(station_view(&mut conn, station, &row.order, Some(row.bumped_at)).await?);
        }

        info!(station_id = %station.id, returned = tickets.len(), "Bumped history loaded");
        Ok(tickets)
    }
}

/// Ticket as a given station displays it.
async fn station_view(
    conn: &mut SqliteConnection,
    station: &Station,
    order: &Order,
    bumped_at: Option<DateTime<Utc>>,
) -> DbResult<Ticket> {
    let full = load_ticket(conn, order).await?;
    let mut ticket = match station.kind {
        StationKind::Prep => full.for_station(&station.id),
        StationKind::Expo => Ticket {
            done_stations: done_prep_stations(conn, &order.id).await?,
            ..full
        },
    };
    ticket.bumped_at = bumped_at;
    Ok(ticket)
}

/// Prep stations holding a placement for the order.
async fn done_prep_stations(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<String>> {
    let stations: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT tp.station_id
        FROM ticket_placements tp
        JOIN stations s ON s.id = tp.station_id
        WHERE tp.order_id = ?1 AND s.kind = 'prep'
        ORDER BY tp.station_id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(stations)
}

/// Builds the full ticket of an order from its persisted items.
pub(crate) async fn load_ticket(conn: &mut SqliteConnection, order: &Order) -> DbResult<Ticket> {
    let items = sqlx::query_as::<_, ItemRow>(
        r#"
        SELECT oi.id AS item_id, oi.menu_item_id, mi.name, oi.quantity, mi.station_id,
               oi.special_instructions, oi.allergy
        FROM order_items oi
        JOIN menu_items mi ON mi.id = oi.menu_item_id
        WHERE oi.order_id = ?1
        ORDER BY oi.position
        "#,
    )
    .bind(&order.id)
    .fetch_all(&mut *conn)
    .await?;

    let modifier_rows = sqlx::query_as::<_, ModifierNameRow>(
        r#"
        SELECT oim.order_item_id, m.name
        FROM order_item_modifiers oim
        JOIN modifiers m ON m.id = oim.modifier_id
        JOIN order_items oi ON oi.id = oim.order_item_id
        WHERE oi.order_id = ?1
        ORDER BY m.name
        "#,
    )
    .bind(&order.id)
    .fetch_all(&mut *conn)
    .await?;

    let mut modifiers: HashMap<String, Vec<String>> = HashMap::new();
    for row in modifier_rows {
        modifiers.entry(row.order_item_id).or_default().push(row.name);
    }

    Ok(Ticket {
        order_id: order.id.clone(),
        order_number: order.order_number.clone(),
        order_type: order.order_type,
        special_instructions: order.special_instructions.clone(),
        allergy: order.allergy,
        created_at: order.created_at,
        items: items
            .into_iter()
            .map(|row| TicketItem {
                modifiers: modifiers.remove(&row.item_id).unwrap_or_default(),
                item_id: row.item_id,
                menu_item_id: row.menu_item_id,
                name: row.name,
                quantity: row.quantity,
                station_id: row.station_id,
                special_instructions: row.special_instructions,
                allergy: row.allergy,
            })
            .collect(),
        done_stations: Vec::new(),
        bumped_at: None,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
