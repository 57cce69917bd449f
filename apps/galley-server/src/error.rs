//! # API Error Type
//!
//! Unified error type for the order and admin routes.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Galley Server                          │
//! │                                                                         │
//! │  POST /orders                                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Handler ── Result<T, ApiError>                                        │
//! │       │                                                                 │
//! │       ├── ValidationError (before any tx) ──► 400 VALIDATION_ERROR      │
//! │       ├── DbError::NotFound (menu item)   ──► 404 NOT_FOUND             │
//! │       ├── DbError::* (tx rolled back)     ──► 500 DATABASE_ERROR        │
//! │       └── anything else                   ──► 500 INTERNAL_ERROR        │
//! │                                                                         │
//! │  Server-side details are logged, never returned.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use galley_core::CoreError;
use galley_db::DbError;
use galley_realtime::RealtimeError;

/// Error body returned by every route.
///
/// ```json
/// { "code": "NOT_FOUND", "message": "MenuItem not found: lobster" }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// 400
    ValidationError,
    /// 401
    Unauthorized,
    /// 403
    NotPermitted,
    /// 404
    NotFound,
    /// 500, transaction rolled back
    DatabaseError,
    /// 500
    InternalError,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::NotPermitted => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn unauthorized() -> Self {
        ApiError::new(ErrorCode::Unauthorized, "Missing or invalid token")
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => {
                ApiError::new(ErrorCode::NotFound, format!("{entity} not found: {id}"))
            }
            DbError::UniqueViolation { field, value } => ApiError::validation(format!(
                "{field} '{value}' already exists"
            )),
            other => {
                tracing::error!(error = %other, "Database operation failed");
                ApiError::new(ErrorCode::DatabaseError, "The order could not be saved")
            }
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => ApiError::validation(e.to_string()),
            e @ CoreError::CommandNotPermitted { .. } => {
                ApiError::new(ErrorCode::NotPermitted, e.to_string())
            }
        }
    }
}

impl From<RealtimeError> for ApiError {
    fn from(err: RealtimeError) -> Self {
        match err {
            RealtimeError::Core(e) => e.into(),
            RealtimeError::Database(e) => e.into(),
            RealtimeError::Unauthorized => ApiError::unauthorized(),
            other => {
                tracing::error!(error = %other, "Request failed");
                ApiError::new(ErrorCode::InternalError, "Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_core::ValidationError;

    #[test]
    fn test_error_codes_serialize_screaming() {
        let json = serde_json::to_string(&ApiError::validation("items is required")).unwrap();
        assert_eq!(json, r#"{"code":"VALIDATION_ERROR","message":"items is required"}"#);
    }

    #[test]
    fn test_database_details_are_hidden() {
        let err = ApiError::from(RealtimeError::Database(DbError::QueryFailed(
            "CHECK constraint failed: ingredients".into(),
        )));
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.message.contains("CHECK"));
        assert_eq!(err.code.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_maps_to_400() {
        let err = ApiError::from(RealtimeError::from(CoreError::from(
            ValidationError::Required {
                field: "items".into(),
            },
        )));
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.code.status(), StatusCode::BAD_REQUEST);
    }
}
