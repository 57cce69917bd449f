//! # Deduction Planning
//!
//! Decides what an order line takes out of inventory. The database layer
//! executes the resulting plan inside the order transaction; nothing here
//! touches storage.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One order line (item × quantity)                     │
//! │                                                                         │
//! │  1. resolve recipe       RecipeLines of the menu item                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  2. resolve substitutions  drop lines whose ingredient a chosen         │
//! │           │                modifier replaces ("No Cheese")             │
//! │           ▼                                                             │
//! │  3. convert units        declared unit → ingredient storage unit       │
//! │           │              (raw amount when the table says None)         │
//! │           ▼                                                             │
//! │  4. decrement plan       amount × quantity per recipe line             │
//! │                          + quantity × 1 per ingredient modifier        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Modifiers always add their own ingredient, even when another modifier on
//! the same line replaces it.
//!
//! ## Menu Item Stock
//! [`stock_after_sale`] is applied after the ingredient decrements. Only the
//! transition from a positive count to zero reports the item as sold out, so
//! a single item is 86'd exactly once.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::UnitError;
use crate::units::UnitTable;

// =============================================================================
// Inputs
// =============================================================================

/// A recipe line joined with its ingredient's storage unit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct RecipeComponent {
    pub ingredient_id: String,
    /// Amount per portion in `unit`.
    pub amount: f64,
    pub unit: Option<String>,
    pub storage_unit: String,
}

/// A modifier chosen on the line.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ChosenModifier {
    pub modifier_id: String,
    pub ingredient_id: Option<String>,
    pub replaces_ingredient_id: Option<String>,
}

/// Everything needed to plan one order line.
#[derive(Debug, Clone, PartialEq)]
pub struct DeductionLine {
    pub menu_item_id: String,
    pub quantity: i64,
    pub recipe: Vec<RecipeComponent>,
    pub modifiers: Vec<ChosenModifier>,
}

// =============================================================================
// Plan
// =============================================================================

/// Why an ingredient is being decremented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecrementSource {
    Recipe,
    Modifier { modifier_id: String },
}

/// One planned ingredient decrement, already in storage units.
#[derive(Debug, Clone, PartialEq)]
pub struct Decrement {
    pub ingredient_id: String,
    pub amount: f64,
    pub source: DecrementSource,
    /// Set when the declared unit could not be converted and the raw amount
    /// was used instead.
    pub fallback: Option<UnitError>,
}

/// Planned decrements for one order line.
#[derive(Debug, Clone, PartialEq)]
pub struct LinePlan {
    pub menu_item_id: String,
    pub quantity: i64,
    pub decrements: Vec<Decrement>,
}

impl LinePlan {
    /// Total planned amount for one ingredient.
    pub fn total_for(&self, ingredient_id: &str) -> f64 {
        self.decrements
            .iter()
            .filter(|d| d.ingredient_id == ingredient_id)
            .map(|d| d.amount)
            .sum()
    }
}

// =============================================================================
// Pipeline Steps
// =============================================================================

/// Ingredients cancelled by the chosen modifiers.
pub fn replaced_ingredients(modifiers: &[ChosenModifier]) -> HashSet<&str> {
    modifiers
        .iter()
        .filter_map(|m| m.replaces_ingredient_id.as_deref())
        .collect()
}

/// Recipe lines that survive substitution.
pub fn effective_recipe<'a>(
    recipe: &'a [RecipeComponent],
    replaced: &'a HashSet<&'a str>,
) -> impl Iterator<Item = &'a RecipeComponent> + 'a {
    recipe
        .iter()
        .filter(move |c| !replaced.contains(c.ingredient_id.as_str()))
}

/// Per-portion amount in the storage unit, with the fallback reason if any.
pub fn convert_component(
    component: &RecipeComponent,
    units: &UnitTable,
) -> (f64, Option<UnitError>) {
    match component.unit.as_deref() {
        None => (component.amount, None),
        Some(declared) => {
            match units.try_convert(component.amount, declared, &component.storage_unit) {
                Ok(amount) => (amount, None),
                Err(reason) => (component.amount, Some(reason)),
            }
        }
    }
}

/// Runs the full pipeline for one line.
pub fn plan_line(line: &DeductionLine, units: &UnitTable) -> LinePlan {
    let quantity = line.quantity as f64;
    let replaced = replaced_ingredients(&line.modifiers);

    let mut decrements: Vec<Decrement> = effective_recipe(&line.recipe, &replaced)
        .map(|component| {
            let (per_portion, fallback) = convert_component(component, units);
            Decrement {
                ingredient_id: component.ingredient_id.clone(),
                amount: per_portion * quantity,
                source: DecrementSource::Recipe,
                fallback,
            }
        })
        .collect();

    decrements.extend(line.modifiers.iter().filter_map(|modifier| {
        modifier.ingredient_id.as_ref().map(|ingredient_id| Decrement {
            ingredient_id: ingredient_id.clone(),
            amount: quantity,
            source: DecrementSource::Modifier {
                modifier_id: modifier.modifier_id.clone(),
            },
            fallback: None,
        })
    }));

    LinePlan {
        menu_item_id: line.menu_item_id.clone(),
        quantity: line.quantity,
        decrements,
    }
}

// =============================================================================
// Menu Item Stock
// =============================================================================

/// Effect of selling `quantity` portions on a menu item's stock counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    /// No counter (unlimited). Nothing is written.
    Unlimited,
    /// Still in stock afterwards.
    Decremented { remaining: i64 },
    /// Went from positive to zero with this sale.
    SoldOut,
    /// Was already at zero; stays at zero and is not reported again.
    AlreadyOut,
}

impl StockChange {
    /// Counter value to persist, if any.
    pub fn new_stock(&self) -> Option<i64> {
        match self {
            StockChange::Unlimited => None,
            StockChange::Decremented { remaining } => Some(*remaining),
            StockChange::SoldOut | StockChange::AlreadyOut => Some(0),
        }
    }

    #[inline]
    pub fn is_sold_out(&self) -> bool {
        matches!(self, StockChange::SoldOut)
    }
}

/// Applies a sale to a stock counter, flooring at zero.
pub fn stock_after_sale(current: Option<i64>, quantity: i64) -> StockChange {
    match current {
        None => StockChange::Unlimited,
        Some(stock) if stock <= 0 => StockChange::AlreadyOut,
        Some(stock) => {
            let remaining = (stock - quantity).max(0);
            if remaining == 0 {
                StockChange::SoldOut
            } else {
                StockChange::Decremented { remaining }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
