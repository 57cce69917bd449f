//! # Inventory Repository
//!
//! Executes deduction plans against ingredient stock and menu item counters,
//! and exposes the resulting ledger.
//!
//! ## Deduction Engine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  deduct(conn, order_id, lines, units)   (inside the order transaction)  │
//! │                                                                         │
//! │  for each line:                                                         │
//! │    ├── load recipe (joined with ingredient storage unit)               │
//! │    ├── load chosen modifiers                                            │
//! │    ├── plan_line()              ← galley-core, pure                     │
//! │    ├── for each decrement:                                              │
//! │    │     UPDATE ingredients SET quantity = MAX(quantity - x, 0)         │
//! │    │     INSERT inventory_ledger                                        │
//! │    └── menu item stock: read → stock_after_sale() → write               │
//! │                                                                         │
//! │  returns ids of items that reached zero with this order                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every statement runs on the caller's connection. An error from any of them
//! propagates out and the caller's transaction rolls back without committing
//! a single decrement.

use std::collections::BTreeSet;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use galley_core::deduction::{
    plan_line, stock_after_sale, ChosenModifier, DecrementSource, DeductionLine, RecipeComponent,
    StockChange,
};
use galley_core::{InventoryLedgerEntry, UnitTable};

/// An order line already inserted in the current transaction.
#[derive(Debug, Clone)]
pub struct PersistedLine {
    pub order_item_id: String,
    pub menu_item_id: String,
    pub quantity: i64,
}

/// Repository for ingredient levels and the ledger.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Quantity on hand in the ingredient's storage unit.
    pub async fn on_hand(&self, ingredient_id: &str) -> DbResult<f64> {
        let quantity: Option<f64> =
            sqlx::query_scalar("SELECT quantity FROM ingredients WHERE id = ?1")
                .bind(ingredient_id)
                .fetch_optional(&self.pool)
                .await?;
        quantity.ok_or_else(|| DbError::not_found("Ingredient", ingredient_id))
    }

    /// Ledger entries recorded for an order, in insertion order.
    pub async fn ledger_for_order(&self, order_id: &str) -> DbResult<Vec<InventoryLedgerEntry>> {
        let entries = sqlx::query_as::<_, InventoryLedgerEntry>(
            r#"
            SELECT id, order_id, menu_item_id, ingredient_id, modifier_id, amount, created_at
            FROM inventory_ledger
            WHERE order_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Total recorded for an ingredient across all orders.
    pub async fn total_deducted(&self, ingredient_id: &str) -> DbResult<f64> {
        let total: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0.0) FROM inventory_ledger WHERE ingredient_id = ?1",
        )
        .bind(ingredient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}

// =============================================================================
// Deduction Engine
// =============================================================================

/// Deducts inventory for every line of an order.
///
/// Must run on a connection inside the order transaction.
pub async fn deduct(
    conn: &mut SqliteConnection,
    order_id: &str,
    lines: &[PersistedLine],
    units: &UnitTable,
) -> DbResult<BTreeSet<String>> {
    let mut sold_out = BTreeSet::new();
    let now = Utc::now();

    for line in lines {
        let deduction = load_line(conn, line).await?;
        let plan = plan_line(&deduction, units);

        for decrement in &plan.decrements {
            if let Some(reason) = &decrement.fallback {
                warn!(
                    order_id = %order_id,
                    menu_item_id = %line.menu_item_id,
                    ingredient_id = %decrement.ingredient_id,
                    %reason,
                    "Unit conversion refused, deducting raw recipe amount"
                );
            }

            sqlx::query("UPDATE ingredients SET quantity = MAX(quantity - ?2, 0) WHERE id = ?1")
                .bind(&decrement.ingredient_id)
                .bind(decrement.amount)
                .execute(&mut *conn)
                .await?;

            let modifier_id = match &decrement.source {
                DecrementSource::Recipe => None,
                DecrementSource::Modifier { modifier_id } => Some(modifier_id.as_str()),
            };

            sqlx::query(
                r#"
                INSERT INTO inventory_ledger (
                    id, order_id, menu_item_id, ingredient_id, modifier_id, amount, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(order_id)
            .bind(&line.menu_item_id)
            .bind(&decrement.ingredient_id)
            .bind(modifier_id)
            .bind(decrement.amount)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        }

        debug!(
            order_id = %order_id,
            menu_item_id = %line.menu_item_id,
            decrements = plan.decrements.len(),
            "Line deducted"
        );

        if apply_stock(conn, &line.menu_item_id, line.quantity).await?.is_sold_out() {
            info!(menu_item_id = %line.menu_item_id, "Menu item sold out");
            sold_out.insert(line.menu_item_id.clone());
        }
    }

    Ok(sold_out)
}

/// Loads recipe and modifiers of one persisted line.
async fn load_line(conn: &mut SqliteConnection, line: &PersistedLine) -> DbResult<DeductionLine> {
    let recipe = sqlx::query_as::<_, RecipeComponent>(
        r#"
        SELECT rl.ingredient_id, rl.amount, rl.unit, i.unit AS storage_unit
        FROM recipe_lines rl
        JOIN ingredients i ON i.id = rl.ingredient_id
        WHERE rl.menu_item_id = ?1
        ORDER BY rl.ingredient_id
        "#,
    )
    .bind(&line.menu_item_id)
    .fetch_all(&mut *conn)
    .await?;

    let modifiers = sqlx::query_as::<_, ChosenModifier>(
        r#"
        SELECT m.id AS modifier_id, m.ingredient_id, m.replaces_ingredient_id
        FROM order_item_modifiers oim
        JOIN modifiers m ON m.id = oim.modifier_id
        WHERE oim.order_item_id = ?1
        ORDER BY m.id
        "#,
    )
    .bind(&line.order_item_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(DeductionLine {
        menu_item_id: line.menu_item_id.clone(),
        quantity: line.quantity,
        recipe,
        modifiers,
    })
}

/// Re-reads and updates a menu item's stock counter.
async fn apply_stock(
    conn: &mut SqliteConnection,
    menu_item_id: &str,
    quantity: i64,
) -> DbResult<StockChange> {
    let current: Option<Option<i64>> =
        sqlx::query_scalar("SELECT stock FROM menu_items WHERE id = ?1")
            .bind(menu_item_id)
            .fetch_optional(&mut *conn)
            .await?;
    let current = current.ok_or_else(|| DbError::not_found("MenuItem", menu_item_id))?;

    let change = stock_after_sale(current, quantity);
    match change {
        StockChange::Unlimited | StockChange::AlreadyOut => {}
        StockChange::Decremented { remaining } => {
            sqlx::query("UPDATE menu_items SET stock = ?2 WHERE id = ?1")
                .bind(menu_item_id)
                .bind(remaining)
                .execute(&mut *conn)
                .await?;
        }
        StockChange::SoldOut => {
            sqlx::query("UPDATE menu_items SET stock = 0, available = 0 WHERE id = ?1")
                .bind(menu_item_id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(change)
}

// =============================================================================
// Unit Tests
// =============================================================================
