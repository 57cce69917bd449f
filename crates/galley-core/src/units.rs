//! # Unit Conversion Table
//!
//! Converts ingredient quantities between units of the same physical kind.
//!
//! ## Conversion Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every unit has a kind and a factor to that kind's base unit:          │
//! │                                                                         │
//! │    weight → g        volume → ml        count → each                   │
//! │                                                                         │
//! │  convert(amount, from, to) = amount * factor(from) / factor(to)        │
//! │                                                                         │
//! │    2 kg → g      = 2 * 1000 / 1      = 2000                            │
//! │    3 tbsp → ml   = 3 * 14.7868 / 1   = 44.36                           │
//! │    1 kg → ml     = None (weight vs volume)                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership
//! There is no global table. A [`UnitTable`] is built from the `units`
//! reference table at startup and handed to whoever needs it; reloading means
//! building a new table and swapping it in.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnitError;

// =============================================================================
// Unit Kind
// =============================================================================

/// Physical quantity a unit measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Weight,
    Volume,
    Count,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Weight => "weight",
            UnitKind::Volume => "volume",
            UnitKind::Count => "count",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitKind {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weight" => Ok(UnitKind::Weight),
            "volume" => Ok(UnitKind::Volume),
            "count" => Ok(UnitKind::Count),
            other => Err(UnitError::Unknown(other.to_string())),
        }
    }
}

// =============================================================================
// Standard Units
// =============================================================================

/// Units every kitchen uses. Mirrors the seed rows of the `units` table.
pub const STANDARD_UNITS: &[(&str, UnitKind, f64)] = &[
    ("mg", UnitKind::Weight, 0.001),
    ("g", UnitKind::Weight, 1.0),
    ("kg", UnitKind::Weight, 1000.0),
    ("oz", UnitKind::Weight, 28.349_523_125),
    ("lb", UnitKind::Weight, 453.592_37),
    ("ml", UnitKind::Volume, 1.0),
    ("l", UnitKind::Volume, 1000.0),
    ("tsp", UnitKind::Volume, 4.928_921_593_75),
    ("tbsp", UnitKind::Volume, 14.786_764_781_25),
    ("fl_oz", UnitKind::Volume, 29.573_529_562_5),
    ("cup", UnitKind::Volume, 236.588_236_5),
    ("pt", UnitKind::Volume, 473.176_473),
    ("qt", UnitKind::Volume, 946.352_946),
    ("gal", UnitKind::Volume, 3785.411_784),
    ("each", UnitKind::Count, 1.0),
    ("dozen", UnitKind::Count, 12.0),
];

// =============================================================================
// Unit Table
// =============================================================================

/// One row of the table.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDef {
    pub name: String,
    pub kind: UnitKind,
    /// Multiplier to the kind's base unit.
    pub factor: f64,
}

/// In-memory unit lookup.
#[derive(Debug, Clone, Default)]
pub struct UnitTable {
    units: HashMap<String, UnitDef>,
}

fn normalize(unit: &str) -> String {
    unit.trim().to_ascii_lowercase()
}

impl UnitTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table containing [`STANDARD_UNITS`].
    pub fn standard() -> Self {
        Self::from_defs(STANDARD_UNITS.iter().map(|(name, kind, factor)| UnitDef {
            name: name.to_string(),
            kind: *kind,
            factor: *factor,
        }))
    }

    /// Builds a table from rows. Later rows win on duplicate names.
    pub fn from_defs(defs: impl IntoIterator<Item = UnitDef>) -> Self {
        let mut table = Self::new();
        for def in defs {
            table.insert(def);
        }
        table
    }

    /// Adds or replaces a unit. Non-positive factors are ignored.
    pub fn insert(&mut self, def: UnitDef) {
        if def.factor <= 0.0 || !def.factor.is_finite() {
            return;
        }
        let key = normalize(&def.name);
        self.units.insert(key.clone(), UnitDef { name: key, ..def });
    }

    pub fn get(&self, unit: &str) -> Option<&UnitDef> {
        self.units.get(&normalize(unit))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Checked conversion.
    ///
    /// Same unit or a zero amount short-circuits, even for units the table
    /// does not know.
    pub fn try_convert(&self, amount: f64, from: &str, to: &str) -> Result<f64, UnitError> {
        let (from_key, to_key) = (normalize(from), normalize(to));
        if from_key == to_key || amount == 0.0 {
            return Ok(amount);
        }

        let from_def = self
            .units
            .get(&from_key)
            .ok_or_else(|| UnitError::Unknown(from_key.clone()))?;
        let to_def = self
            .units
            .get(&to_key)
            .ok_or_else(|| UnitError::Unknown(to_key.clone()))?;

        if from_def.kind != to_def.kind {
            return Err(UnitError::Incompatible {
                from: from_key,
                from_kind: from_def.kind.to_string(),
                to: to_key,
                to_kind: to_def.kind.to_string(),
            });
        }

        Ok(amount * from_def.factor / to_def.factor)
    }

    /// Lenient conversion. `None` means "use the raw amount".
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> Option<f64> {
        self.try_convert(amount, from, to).ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn test_same_unit_is_identity() {
        let table = UnitTable::standard();
        assert_eq!(table.convert(3.5, "g", "g"), Some(3.5));
        assert_eq!(table.convert(3.5, "G", " g "), Some(3.5));
        // unknown units still short-circuit
        assert_eq!(table.convert(3.5, "slice", "slice"), Some(3.5));
    }

    #[test]
    fn test_zero_amount_is_identity() {
        let table = UnitTable::standard();
        assert_eq!(table.convert(0.0, "kg", "ml"), Some(0.0));
    }

    #[test]
    fn test_basic_conversions() {
        let table = UnitTable::standard();
        assert_eq!(table.convert(2.0, "kg", "g"), Some(2000.0));
        assert_eq!(table.convert(500.0, "ml", "l"), Some(0.5));
        assert_eq!(table.convert(2.0, "dozen", "each"), Some(24.0));
        let oz = table.convert(1.0, "lb", "oz").unwrap();
        assert!(close(oz, 16.0));
    }

    #[test]
    fn test_cross_kind_is_refused() {
        let table = UnitTable::standard();
        assert_eq!(table.convert(1.0, "kg", "ml"), None);
        assert!(matches!(
            table.try_convert(1.0, "cup", "each"),
            Err(UnitError::Incompatible { .. })
        ));
    }

    #[test]
    fn test_unknown_unit() {
        let table = UnitTable::standard();
        assert_eq!(
            table.try_convert(1.0, "pinch", "g"),
            Err(UnitError::Unknown("pinch".to_string()))
        );
        assert_eq!(table.convert(1.0, "g", "pinch"), None);
    }

    #[test]
    fn test_round_trip_same_kind() {
        let table = UnitTable::standard();
        let amounts = [0.001, 0.5, 1.0, 7.25, 1234.5678];
        for (a, kind_a, _) in STANDARD_UNITS {
            for (b, kind_b, _) in STANDARD_UNITS {
                if kind_a != kind_b {
                    continue;
                }
                for amount in amounts {
                    let there = table.convert(amount, a, b).unwrap();
                    let back = table.convert(there, b, a).unwrap();
                    assert!(close(back, amount), "{amount} {a} -> {b} -> {a} = {back}");
                }
            }
        }
    }

    #[test]
    fn test_insert_overrides_and_rejects_bad_factor() {
        let mut table = UnitTable::standard();
        let before = table.len();

        table.insert(UnitDef {
            name: "Case".to_string(),
            kind: UnitKind::Count,
            factor: 24.0,
        });
        assert_eq!(table.len(), before + 1);
        assert_eq!(table.convert(1.0, "case", "each"), Some(24.0));

        table.insert(UnitDef {
            name: "broken".to_string(),
            kind: UnitKind::Count,
            factor: 0.0,
        });
        assert!(table.get("broken").is_none());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("Weight".parse::<UnitKind>().unwrap(), UnitKind::Weight);
        assert!("length".parse::<UnitKind>().is_err());
    }
}
