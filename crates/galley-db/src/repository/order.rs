//! # Order Repository
//!
//! The order intake transaction and order header reads.
//!
//! ## Intake Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    place_order (one transaction)                        │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │   ├── INSERT orders            ← first statement is a write, so this   │
//! │   │                              transaction owns the write lock now   │
//! │   ├── INSERT order_items        (unknown menu item → NotFound)         │
//! │   ├── INSERT order_item_modifiers (unknown modifier → NotFound)        │
//! │   ├── deduct()                  ingredients, ledger, menu item stock   │
//! │   ├── re-read ticket            items + menu names + modifier names    │
//! │   └── read stations → fan_out() per-station payloads                   │
//! │  COMMIT                                                                │
//! │                                                                         │
//! │  Any error before COMMIT drops the transaction: nothing is persisted.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Fan-out, backups and menu notifications happen after commit in the kitchen
//! service; this repository never publishes anything.

use std::collections::BTreeSet;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::inventory::{self, PersistedLine};
use crate::repository::ticket::load_ticket;
use galley_core::routing::fan_out;
use galley_core::{NewOrder, Order, Station, StationTicket, Ticket, UnitTable};

/// Result of a committed intake transaction.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    /// The whole ticket as persisted.
    pub ticket: Ticket,
    /// One payload per receiving station.
    pub fan_out: Vec<StationTicket>,
    /// Menu items that reached zero stock with this order.
    pub sold_out: BTreeSet<String>,
}

/// Repository for orders.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Persists an order, deducts inventory and builds the fan-out payloads.
    ///
    /// The caller validates `new_order` beforehand.
    pub async fn place_order(&self, new_order: &NewOrder, units: &UnitTable) -> DbResult<PlacedOrder> {
        let order_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let business_date = now.format("%Y-%m-%d").to_string();
        let order_type = new_order.order_type.unwrap_or_default();

        let mut tx = self.pool.begin().await?;

        let order_number: String = sqlx::query_scalar(
            r#"
            INSERT INTO orders (
                id, order_number, order_type, special_instructions, allergy,
                status, business_date, created_at
            ) VALUES (
                ?1,
                COALESCE(?2, (SELECT CAST(COUNT(*) + 1 AS TEXT) FROM orders WHERE business_date = ?6)),
                ?3, ?4, ?5, 'active', ?6, ?7
            )
            RETURNING order_number
            "#,
        )
        .bind(&order_id)
        .bind(new_order.order_number.as_deref().map(str::trim))
        .bind(order_type)
        .bind(&new_order.special_instructions)
        .bind(new_order.allergy)
        .bind(&business_date)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        debug!(order_id = %order_id, order_number = %order_number, "Order header inserted");

        let mut lines = Vec::with_capacity(new_order.items.len());
        for (position, item) in new_order.items.iter().enumerate() {
            let order_item_id = Uuid::new_v4().to_string();

            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, menu_item_id, quantity, special_instructions, allergy, position
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&order_item_id)
            .bind(&order_id)
            .bind(&item.menu_item_id)
            .bind(item.quantity)
            .bind(&item.special_instructions)
            .bind(item.allergy)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| missing_reference(e, "MenuItem", &item.menu_item_id))?;

            for modifier_id in &item.modifier_ids {
                sqlx::query(
                    "INSERT INTO order_item_modifiers (order_item_id, modifier_id) VALUES (?1, ?2)",
                )
                .bind(&order_item_id)
                .bind(modifier_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| missing_reference(e, "Modifier", modifier_id))?;
            }

            lines.push(PersistedLine {
                order_item_id,
                menu_item_id: item.menu_item_id.clone(),
                quantity: item.quantity,
            });
        }

        let sold_out = inventory::deduct(&mut tx, &order_id, &lines, units).await?;

        let order = fetch_order(&mut tx, &order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", &order_id))?;
        let ticket = load_ticket(&mut tx, &order).await?;
        let stations = sqlx::query_as::<_, Station>(
            "SELECT id, name, kind, order_type_filter FROM stations ORDER BY id",
        )
        .fetch_all(&mut *tx)
        .await?;
        let fan_out = fan_out(&ticket, &stations);

        tx.commit().await?;

        info!(
            order_id = %order_id,
            order_number = %order.order_number,
            lines = lines.len(),
            stations = fan_out.len(),
            sold_out = sold_out.len(),
            "Order placed"
        );

        Ok(PlacedOrder {
            order,
            ticket,
            fan_out,
            sold_out,
        })
    }

    /// Gets an order header by ID.
    pub async fn get(&self, order_id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, order_id).await
    }

    /// Whole ticket of an order, regardless of status.
    pub async fn ticket(&self, order_id: &str) -> DbResult<Ticket> {
        let mut conn = self.pool.acquire().await?;
        let order = fetch_order(&mut conn, order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;
        load_ticket(&mut conn, &order).await
    }

    /// Number of persisted orders.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Reads one order header on the given connection.
pub(crate) async fn fetch_order(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(
        r#"
        SELECT id, order_number, order_type, special_instructions, allergy,
               status, created_at, completed_at
        FROM orders
        WHERE id = ?1
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(order)
}

/// Maps a foreign key failure on an insert to `NotFound` for the referenced id.
fn missing_reference(err: sqlx::Error, entity: &str, id: &str) -> DbError {
    match DbError::from(err) {
        DbError::ForeignKeyViolation { .. } => DbError::not_found(entity, id),
        other => other,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
