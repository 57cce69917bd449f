//! # Demo Kitchen Seeder
//!
//! Populates a database with the demo kitchen for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./galley_dev.db (default)
//! cargo run -p galley-db --bin seed
//!
//! # Specify database path
//! cargo run -p galley-db --bin seed -- --db ./data/kitchen.db
//! ```
//!
//! ## Seeded Data
//! - Stations: grill, fry (prep), expo
//! - Menu: Burger, Fries, Chef's Special (stock 1)
//! - Modifiers: No Cheese, Extra Bacon, Gluten-Free Bun, Well Done

use std::env;

use galley_db::{seed_demo_kitchen, Database, DbConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./galley_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" | "--db" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "-h" | "--help" => {
                println!("Galley Demo Kitchen Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./galley_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Galley Demo Kitchen Seeder");
    println!("=============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.catalog().stations().await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} stations", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    seed_demo_kitchen(&db).await?;

    let menu = db.catalog().menu_items().await?;
    println!("✓ Seeded {} menu items", menu.len());
    for item in &menu {
        println!("  {:<16} → {}", item.name, item.station_id);
    }

    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}
