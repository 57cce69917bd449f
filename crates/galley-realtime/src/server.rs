//! # Station Routes
//!
//! The HTTP surface stations talk to, shared by both transports.
//!
//! | Route                                              | Purpose              |
//! |----------------------------------------------------|----------------------|
//! | `GET  /ws`                                         | WebSocket transport  |
//! | `GET  /events?stationId=..&token=..`               | SSE transport        |
//! | `GET  /stations/{id}/open`                         | catch-up: open       |
//! | `GET  /stations/{id}/history?limit=..`             | catch-up: bumped     |
//! | `POST /stations/{id}/tickets/{order_id}/{command}` | bump/recall/urgent   |
//!
//! Station routes require `Authorization: Bearer <token>` when a shared token
//! is configured. Without one they are open: any caller can send ticket
//! commands under any station id.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{error, warn};

use galley_core::ticket::StationCommand;
use galley_core::{CoreError, Ticket};
use galley_db::DbError;

use crate::config::AuthSettings;
use crate::error::{RealtimeError, RealtimeResult};
use crate::hub::StationHub;
use crate::kitchen::KitchenService;
use crate::protocol::{error_code, CommandAck, ErrorFrame};
use crate::{sse, ws};

/// Shared state of the station routes.
#[derive(Clone)]
pub struct RealtimeState {
    pub kitchen: Arc<KitchenService>,
    pub hub: StationHub,
    pub auth: Arc<AuthSettings>,
}

impl RealtimeState {
    pub fn new(kitchen: Arc<KitchenService>, hub: StationHub, auth: AuthSettings) -> Self {
        RealtimeState {
            kitchen,
            hub,
            auth: Arc::new(auth),
        }
    }
}

/// Builds the station router.
pub fn router(state: RealtimeState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/events", get(sse::sse_handler))
        .route("/stations/{station_id}/open", get(open_tickets))
        .route("/stations/{station_id}/history", get(history))
        .route(
            "/stations/{station_id}/tickets/{order_id}/{command}",
            post(station_command),
        )
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

async fn open_tickets(
    State(state): State<RealtimeState>,
    Path(station_id): Path<String>,
    headers: HeaderMap,
) -> RealtimeResult<Json<Vec<Ticket>>> {
    check_token(&state, &headers)?;
    Ok(Json(state.kitchen.open_tickets(&station_id).await?))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

async fn history(
    State(state): State<RealtimeState>,
    Path(station_id): Path<String>,
    Query(query): Query<HistoryQuery>,
    headers: HeaderMap,
) -> RealtimeResult<Json<Vec<Ticket>>> {
    check_token(&state, &headers)?;
    Ok(Json(state.kitchen.history(&station_id, query.limit).await?))
}

async fn station_command(
    State(state): State<RealtimeState>,
    Path((station_id, order_id, command)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> RealtimeResult<Json<CommandAck>> {
    check_token(&state, &headers)?;
    let command = parse_command(&command)?;

    let station = state.kitchen.register_station(&station_id).await?;
    state.kitchen.execute(&station, command, &order_id).await?;

    Ok(Json(CommandAck { command, order_id }))
}

// =============================================================================
// Helpers
// =============================================================================

/// Token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

fn check_token(state: &RealtimeState, headers: &HeaderMap) -> RealtimeResult<()> {
    if state.auth.token_matches(bearer_token(headers)) {
        Ok(())
    } else {
        Err(RealtimeError::Unauthorized)
    }
}

fn parse_command(raw: &str) -> RealtimeResult<StationCommand> {
    match raw {
        "bump" => Ok(StationCommand::Bump),
        "recall" => Ok(StationCommand::Recall),
        "urgent" => Ok(StationCommand::Urgent),
        other => Err(RealtimeError::InvalidMessage(format!("unknown command: {other}"))),
    }
}

/// HTTP status for a realtime error.
pub fn status_code(err: &RealtimeError) -> StatusCode {
    match err {
        RealtimeError::Core(CoreError::Validation(_)) => StatusCode::BAD_REQUEST,
        RealtimeError::Core(CoreError::CommandNotPermitted { .. }) => StatusCode::FORBIDDEN,
        RealtimeError::Database(DbError::NotFound { .. }) => StatusCode::NOT_FOUND,
        RealtimeError::Unauthorized => StatusCode::UNAUTHORIZED,
        RealtimeError::OriginRejected(_) => StatusCode::FORBIDDEN,
        RealtimeError::InvalidMessage(_) | RealtimeError::NotRegistered => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for RealtimeError {
    fn into_response(self) -> Response {
        let status = status_code(&self);
        if status.is_server_error() {
            error!(error = %self, "Station request failed");
        } else {
            warn!(code = error_code(&self), error = %self, "Station request rejected");
        }

        (status, Json(ErrorFrame::from_error(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubSettings;
    use axum::body::Body;
    use axum::http::Request;
    use futures_util::StreamExt;
    use galley_core::{NewOrder, NewOrderItem};
    use galley_db::{seed_demo_kitchen, Database, DbConfig};
    use tower::ServiceExt;

    async fn state_with(auth: AuthSettings) -> RealtimeState {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_demo_kitchen(&db).await.unwrap();
        let hub = StationHub::new(&HubSettings::default());
        let kitchen = KitchenService::new(db, Arc::new(hub.clone())).await.unwrap();
        RealtimeState::new(Arc::new(kitchen), hub, auth)
    }

    fn secured() -> AuthSettings {
        AuthSettings {
            token: Some("s3cret".to_string()),
            allowed_origins: vec!["https://kds.example".to_string()],
        }
    }

    async fn place_burger(state: &RealtimeState) -> String {
        state
            .kitchen
            .place_order(&NewOrder {
                items: vec![NewOrderItem::new("burger", 1)],
                ..Default::default()
            })
            .await
            .unwrap()
            .order
            .id
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_open_tickets_requires_token() {
        let state = state_with(secured()).await;
        place_burger(&state).await;
        let app = router(state);

        let response = app
            .clone()
            .oneshot(Request::get("/stations/grill/open").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");

        let response = app
            .oneshot(
                Request::get("/stations/grill/open")
                    .header("authorization", "Bearer s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let tickets = body_json(response).await;
        assert_eq!(tickets.as_array().unwrap().len(), 1);
        assert_eq!(tickets[0]["items"][0]["menuItemId"], "burger");
    }

    #[tokio::test]
    async fn test_http_commands() {
        let state = state_with(AuthSettings::default()).await;
        let order_id = place_burger(&state).await;
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::post(format!("/stations/grill/tickets/{order_id}/bump"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let ack = body_json(response).await;
        assert_eq!(ack["command"], "bump");
        assert_eq!(ack["orderId"], order_id.as_str());

        let history = state.kitchen.history("grill", None).await.unwrap();
        assert_eq!(history.len(), 1);

        let response = app
            .clone()
            .oneshot(
                Request::post(format!("/stations/grill/tickets/{order_id}/urgent"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["code"], "NOT_PERMITTED");

        let response = app
            .clone()
            .oneshot(
                Request::post("/stations/grill/tickets/missing/bump")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(
                Request::post(format!("/stations/grill/tickets/{order_id}/flambe"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sse_rejections_happen_before_registering() {
        let state = state_with(secured()).await;
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(Request::get("/events?stationId=grill").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(
                Request::get("/events?stationId=grill&token=s3cret")
                    .header("origin", "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(
                Request::get("/events?stationId=bar&token=s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        assert_eq!(state.hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_sse_stream_starts_with_registered_then_events() {
        let state = state_with(secured()).await;
        let app = router(state.clone());

        let response = app
            .oneshot(
                Request::get("/events?stationId=grill&token=s3cret")
                    .header("origin", "https://kds.example/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );
        assert_eq!(state.hub.subscriber_count(), 1);

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        let first = String::from_utf8_lossy(&first).to_string();
        assert!(first.starts_with("event: registered\n"));
        assert!(first.contains(r#""stationId":"grill""#));

        place_burger(&state).await;
        let second = body.next().await.unwrap().unwrap();
        let second = String::from_utf8_lossy(&second).to_string();
        assert!(second.starts_with("event: orderAdded\n"));

        drop(body);
        assert_eq!(state.hub.subscriber_count(), 0);
    }
}
