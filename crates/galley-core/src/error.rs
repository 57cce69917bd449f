//! # Error Types
//!
//! Domain-specific error types for galley-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  galley-core errors (this file)                                        │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── UnitError        - Why a unit conversion was refused              │
//! │                                                                         │
//! │  galley-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  galley-realtime errors                                                │
//! │  └── RealtimeError    - Transport and kitchen service failures         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → RealtimeError → ApiError → client │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A station tried a command its kind does not allow.
    ///
    /// ## When This Occurs
    /// - A prep station sends `urgent` (expo-only)
    #[error("Station {station_id} ({kind}) may not {command}")]
    CommandNotPermitted {
        station_id: String,
        kind: String,
        command: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur before any transaction is opened.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Too many entries in a collection.
    #[error("{field} cannot have more than {max} entries")]
    TooMany { field: String, max: usize },

    /// Same value listed twice.
    #[error("{field} '{value}' is listed more than once")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Unit Error
// =============================================================================

/// Reasons a checked unit conversion fails.
///
/// The deduction pipeline never fails on these; it falls back to the raw
/// amount and logs the reason.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitError {
    /// The unit is not present in the table.
    #[error("unknown unit '{0}'")]
    Unknown(String),

    /// The units measure different physical quantities.
    #[error("cannot convert {from} ({from_kind}) to {to} ({to_kind})")]
    Incompatible {
        from: String,
        from_kind: String,
        to: String,
        to_kind: String,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
