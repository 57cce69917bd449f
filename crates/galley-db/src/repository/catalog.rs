//! # Catalog Repository
//!
//! Reads (and, for seeding and admin overrides, writes) the reference data the
//! kitchen core works against: stations, menu items, ingredients, recipes,
//! modifiers and the unit table.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use galley_core::units::{UnitDef, UnitKind, UnitTable};
use galley_core::{Ingredient, MenuItem, Modifier, RecipeLine, Station};

#[derive(sqlx::FromRow)]
struct UnitRow {
    name: String,
    kind: UnitKind,
    factor: f64,
}

/// Repository for catalog tables.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // =========================================================================
    // Stations
    // =========================================================================

    /// All stations, ordered by id.
    pub async fn stations(&self) -> DbResult<Vec<Station>> {
        let stations = sqlx::query_as::<_, Station>(
            "SELECT id, name, kind, order_type_filter FROM stations ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(stations)
    }

    /// Looks up one station.
    pub async fn station(&self, id: &str) -> DbResult<Option<Station>> {
        let station = sqlx::query_as::<_, Station>(
            "SELECT id, name, kind, order_type_filter FROM stations WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(station)
    }

    /// Looks up one station or fails with `NotFound`.
    pub async fn require_station(&self, id: &str) -> DbResult<Station> {
        self.station(id)
            .await?
            .ok_or_else(|| DbError::not_found("Station", id))
    }

    pub async fn insert_station(&self, station: &Station) -> DbResult<()> {
        debug!(id = %station.id, kind = station.kind.as_str(), "Inserting station");
        sqlx::query(
            "INSERT INTO stations (id, name, kind, order_type_filter) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&station.id)
        .bind(&station.name)
        .bind(station.kind)
        .bind(station.order_type_filter)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Menu
    // =========================================================================

    pub async fn menu_item(&self, id: &str) -> DbResult<Option<MenuItem>> {
        let item = sqlx::query_as::<_, MenuItem>(
            r#"
            SELECT id, name, price_cents, station_id, stock, available
            FROM menu_items
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    /// Full menu, ordered by name.
    pub async fn menu_items(&self) -> DbResult<Vec<MenuItem>> {
        let items = sqlx::query_as::<_, MenuItem>(
            r#"
            SELECT id, name, price_cents, station_id, stock, available
            FROM menu_items
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn insert_menu_item(&self, item: &MenuItem) -> DbResult<()> {
        debug!(id = %item.id, station_id = %item.station_id, "Inserting menu item");
        sqlx::query(
            r#"
            INSERT INTO menu_items (id, name, price_cents, station_id, stock, available)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(item.price_cents)
        .bind(&item.station_id)
        .bind(item.stock)
        .bind(item.available)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Administrative override of stock and availability (restock, un-86).
    pub async fn set_menu_item_stock(
        &self,
        id: &str,
        stock: Option<i64>,
        available: bool,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE menu_items SET stock = ?2, available = ?3 WHERE id = ?1")
            .bind(id)
            .bind(stock)
            .bind(available)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("MenuItem", id));
        }
        info!(id = %id, ?stock, available, "Menu item stock overridden");
        Ok(())
    }

    // =========================================================================
    // Ingredients, recipes, modifiers
    // =========================================================================

    pub async fn ingredient(&self, id: &str) -> DbResult<Option<Ingredient>> {
        let ingredient = sqlx::query_as::<_, Ingredient>(
            "SELECT id, name, unit, quantity, cost_cents FROM ingredients WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ingredient)
    }

    pub async fn insert_ingredient(&self, ingredient: &Ingredient) -> DbResult<()> {
        debug!(id = %ingredient.id, unit = %ingredient.unit, "Inserting ingredient");
        sqlx::query(
            r#"
            INSERT INTO ingredients (id, name, unit, quantity, cost_cents)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&ingredient.id)
        .bind(&ingredient.name)
        .bind(&ingredient.unit)
        .bind(ingredient.quantity)
        .bind(ingredient.cost_cents)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Recipe of one menu item.
    pub async fn recipe(&self, menu_item_id: &str) -> DbResult<Vec<RecipeLine>> {
        let lines = sqlx::query_as::<_, RecipeLine>(
            r#"
            SELECT menu_item_id, ingredient_id, amount, unit
            FROM recipe_lines
            WHERE menu_item_id = ?1
            ORDER BY ingredient_id
            "#,
        )
        .bind(menu_item_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }

    pub async fn insert_recipe_line(&self, line: &RecipeLine) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recipe_lines (menu_item_id, ingredient_id, amount, unit)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&line.menu_item_id)
        .bind(&line.ingredient_id)
        .bind(line.amount)
        .bind(&line.unit)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn modifier(&self, id: &str) -> DbResult<Option<Modifier>> {
        let modifier = sqlx::query_as::<_, Modifier>(
            "SELECT id, name, ingredient_id, replaces_ingredient_id FROM modifiers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(modifier)
    }

    pub async fn insert_modifier(&self, modifier: &Modifier) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO modifiers (id, name, ingredient_id, replaces_ingredient_id)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&modifier.id)
        .bind(&modifier.name)
        .bind(&modifier.ingredient_id)
        .bind(&modifier.replaces_ingredient_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Units
    // =========================================================================

    /// Rows of the unit reference table.
    pub async fn units(&self) -> DbResult<Vec<UnitDef>> {
        let rows = sqlx::query_as::<_, UnitRow>("SELECT name, kind, factor FROM units")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| UnitDef {
                name: row.name,
                kind: row.kind,
                factor: row.factor,
            })
            .collect())
    }

    /// Builds a fresh [`UnitTable`] from the reference table.
    pub async fn load_unit_table(&self) -> DbResult<UnitTable> {
        let table = UnitTable::from_defs(self.units().await?);
        debug!(units = table.len(), "Unit table loaded");
        Ok(table)
    }

    pub async fn upsert_unit(&self, unit: &UnitDef) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO units (name, kind, factor) VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET kind = excluded.kind, factor = excluded.factor
            "#,
        )
        .bind(unit.name.trim().to_ascii_lowercase())
        .bind(unit.kind)
        .bind(unit.factor)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{seed_kitchen, test_db};
    use galley_core::units::{UnitDef, UnitKind};
    use galley_core::StationKind;

    #[tokio::test]
    async fn test_stations_roundtrip() {
        let db = test_db().await;
        seed_kitchen(&db).await;

        let stations = db.catalog().stations().await.unwrap();
        assert_eq!(stations.len(), 3);

        let expo = db.catalog().require_station("expo").await.unwrap();
        assert_eq!(expo.kind, StationKind::Expo);
        assert!(db.catalog().station("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unit_table_loads_and_reloads() {
        let db = test_db().await;
        let table = db.catalog().load_unit_table().await.unwrap();
        assert_eq!(table.convert(1.0, "kg", "g"), Some(1000.0));
        assert!(table.get("case").is_none());

        db.catalog()
            .upsert_unit(&UnitDef {
                name: "Case".to_string(),
                kind: UnitKind::Count,
                factor: 24.0,
            })
            .await
            .unwrap();

        let reloaded = db.catalog().load_unit_table().await.unwrap();
        assert_eq!(reloaded.convert(2.0, "case", "each"), Some(48.0));
    }

    #[tokio::test]
    async fn test_stock_override() {
        let db = test_db().await;
        seed_kitchen(&db).await;

        db.catalog()
            .set_menu_item_stock("burger", Some(5), true)
            .await
            .unwrap();
        let burger = db.catalog().menu_item("burger").await.unwrap().unwrap();
        assert_eq!(burger.stock, Some(5));

        assert!(db
            .catalog()
            .set_menu_item_stock("ghost", None, true)
            .await
            .is_err());
    }
}
