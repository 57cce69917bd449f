//! # Validation Module
//!
//! Order intake checks that run before any transaction opens.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP extractor (axum Json)                                   │
//! │  └── Shape and enum values (orderType must be a known type)            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Non-empty items, quantity range, text lengths                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  └── Foreign keys: menu item and modifier ids must exist               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{NewOrder, NewOrderItem};
use crate::{MAX_INSTRUCTIONS_LEN, MAX_ITEM_QUANTITY, MAX_ORDER_LINES, MAX_ORDER_NUMBER_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a submitted order.
///
/// ## Example
/// ```rust
/// use galley_core::validation::validate_new_order;
/// use galley_core::{NewOrder, NewOrderItem};
///
/// let empty = NewOrder::default();
/// assert!(validate_new_order(&empty).is_err());
///
/// let order = NewOrder {
///     items: vec![NewOrderItem::new("burger", 2)],
///     ..Default::default()
/// };
/// assert!(validate_new_order(&order).is_ok());
/// ```
pub fn validate_new_order(order: &NewOrder) -> ValidationResult<()> {
    if order.items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }
    if order.items.len() > MAX_ORDER_LINES {
        return Err(ValidationError::TooMany {
            field: "items".to_string(),
            max: MAX_ORDER_LINES,
        });
    }

    if let Some(number) = &order.order_number {
        if number.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "orderNumber".to_string(),
            });
        }
        validate_len("orderNumber", number, MAX_ORDER_NUMBER_LEN)?;
    }
    if let Some(text) = &order.special_instructions {
        validate_len("specialInstructions", text, MAX_INSTRUCTIONS_LEN)?;
    }

    order.items.iter().try_for_each(validate_item)
}

/// Validates one order line.
pub fn validate_item(item: &NewOrderItem) -> ValidationResult<()> {
    if item.menu_item_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "menuItemId".to_string(),
        });
    }
    if !(1..=MAX_ITEM_QUANTITY).contains(&item.quantity) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }
    if let Some(text) = &item.special_instructions {
        validate_len("specialInstructions", text, MAX_INSTRUCTIONS_LEN)?;
    }

    let mut seen: Vec<&str> = Vec::with_capacity(item.modifier_ids.len());
    for modifier_id in &item.modifier_ids {
        if seen.contains(&modifier_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "modifierIds".to_string(),
                value: modifier_id.clone(),
            });
        }
        seen.push(modifier_id);
    }
    Ok(())
}

fn validate_len(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}
