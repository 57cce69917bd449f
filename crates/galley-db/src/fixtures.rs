//! Demo kitchen used by the seed binary and the test suites.
//!
//! ```text
//!   grill (prep)   burger, special (stock 1)
//!   fry   (prep)   fries
//!   expo  (expo)   sees everything
//! ```

use tracing::info;

use crate::error::DbResult;
use crate::pool::Database;
use galley_core::{Ingredient, MenuItem, Modifier, RecipeLine, Station, StationKind};

fn station(id: &str, name: &str, kind: StationKind) -> Station {
    Station {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        order_type_filter: None,
    }
}

fn ingredient(id: &str, name: &str, unit: &str, quantity: f64, cost_cents: i64) -> Ingredient {
    Ingredient {
        id: id.to_string(),
        name: name.to_string(),
        unit: unit.to_string(),
        quantity,
        cost_cents,
    }
}

fn menu_item(id: &str, name: &str, price_cents: i64, station_id: &str, stock: Option<i64>) -> MenuItem {
    MenuItem {
        id: id.to_string(),
        name: name.to_string(),
        price_cents,
        station_id: station_id.to_string(),
        stock,
        available: true,
    }
}

fn recipe(menu_item_id: &str, ingredient_id: &str, amount: f64, unit: Option<&str>) -> RecipeLine {
    RecipeLine {
        menu_item_id: menu_item_id.to_string(),
        ingredient_id: ingredient_id.to_string(),
        amount,
        unit: unit.map(str::to_string),
    }
}

fn modifier(id: &str, name: &str, adds: Option<&str>, replaces: Option<&str>) -> Modifier {
    Modifier {
        id: id.to_string(),
        name: name.to_string(),
        ingredient_id: adds.map(str::to_string),
        replaces_ingredient_id: replaces.map(str::to_string),
    }
}

/// Inserts the demo stations, menu, ingredients, recipes and modifiers.
///
/// Fails with `UniqueViolation` if run twice against the same database.
pub async fn seed_demo_kitchen(db: &Database) -> DbResult<()> {
    let catalog = db.catalog();

    for s in [
        station("grill", "Grill", StationKind::Prep),
        station("fry", "Fryer", StationKind::Prep),
        station("expo", "Expo", StationKind::Expo),
    ] {
        catalog.insert_station(&s).await?;
    }

    for i in [
        ingredient("bun", "Brioche Bun", "each", 100.0, 35),
        ingredient("patty", "Beef Patty Mix", "kg", 10.0, 1400),
        ingredient("cheese", "Cheddar Slice", "each", 50.0, 20),
        ingredient("fries", "Cut Potatoes", "kg", 20.0, 250),
        ingredient("oil", "Fryer Oil", "l", 10.0, 300),
        ingredient("bacon", "Bacon Strip", "each", 30.0, 45),
        ingredient("gf-bun", "Gluten-Free Bun", "each", 10.0, 80),
    ] {
        catalog.insert_ingredient(&i).await?;
    }

    for item in [
        menu_item("burger", "Burger", 1250, "grill", None),
        menu_item("fries", "Fries", 450, "fry", None),
        menu_item("special", "Chef's Special", 2200, "grill", Some(1)),
    ] {
        catalog.insert_menu_item(&item).await?;
    }

    for line in [
        recipe("burger", "bun", 1.0, Some("each")),
        recipe("burger", "patty", 150.0, Some("g")),
        recipe("burger", "cheese", 2.0, None),
        recipe("fries", "fries", 200.0, Some("g")),
        recipe("fries", "oil", 50.0, Some("ml")),
        recipe("special", "patty", 200.0, Some("g")),
    ] {
        catalog.insert_recipe_line(&line).await?;
    }

    for m in [
        modifier("no-cheese", "No Cheese", None, Some("cheese")),
        modifier("extra-bacon", "Extra Bacon", Some("bacon"), None),
        modifier("gf-bun", "Gluten-Free Bun", Some("gf-bun"), Some("bun")),
        modifier("well-done", "Well Done", None, None),
    ] {
        catalog.insert_modifier(&m).await?;
    }

    info!("Demo kitchen seeded");
    Ok(())
}
