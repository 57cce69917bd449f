//! # Server Routes
//!
//! Point-of-sale intake and operator routes. Station routes come from
//! [`galley_realtime::router`] and are merged in by [`build_app`].
//!
//! | Route                      | Auth   | Response                         |
//! |----------------------------|--------|----------------------------------|
//! | `POST /orders`             | none   | `201 {orderId, orderNumber}`     |
//! | `POST /admin/units/reload` | bearer | `{units}`                        |
//! | `GET  /health`             | none   | `200` or `503` with details      |

use std::future::Future;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use galley_core::NewOrder;
use galley_realtime::config::AuthSettings;
use galley_realtime::{bearer_token, RealtimeState};

use crate::error::ApiError;

/// Builds the full application router.
pub fn build_app(state: RealtimeState) -> Router {
    let cors = cors_layer(&state.auth);

    Router::new()
        .route("/orders", post(place_order))
        .route("/admin/units/reload", post(reload_units))
        .route("/health", get(health))
        .with_state(state.clone())
        .merge(galley_realtime::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serves the app until `signal` resolves, running the hub heartbeat
/// meanwhile.
///
/// Station streams never end on their own, so on the signal the heartbeat is
/// stopped and every hub subscriber is closed before connections drain.
pub async fn serve(
    listener: TcpListener,
    state: RealtimeState,
    signal: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let hub = state.hub.clone();
    let heartbeat = hub.spawn_heartbeat();
    let stop_heartbeat = heartbeat.abort_handle();

    let result = axum::serve(listener, build_app(state))
        .with_graceful_shutdown(async move {
            signal.await;
            stop_heartbeat.abort();
            let closed = hub.close_all();
            info!(closed, "Station streams closed, draining connections");
        })
        .await;

    heartbeat.abort();
    result
}

fn cors_layer(auth: &AuthSettings) -> CorsLayer {
    if auth.allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = auth
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim_end_matches('/')) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring unusable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreated {
    order_id: String,
    order_number: String,
}

async fn place_order(
    State(state): State<RealtimeState>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderCreated>), ApiError> {
    let Json(new_order) = payload.map_err(|rejection| ApiError::validation(rejection.body_text()))?;

    let placed = state.kitchen.place_order(&new_order).await?;
    info!(
        order_id = %placed.order.id,
        order_number = %placed.order.order_number,
        "Order accepted"
    );

    Ok((
        StatusCode::CREATED,
        Json(OrderCreated {
            order_id: placed.order.id,
            order_number: placed.order.order_number,
        }),
    ))
}

// =============================================================================
// Admin
// =============================================================================

#[derive(Debug, Serialize)]
struct UnitsReloaded {
    units: usize,
}

async fn reload_units(
    State(state): State<RealtimeState>,
    headers: HeaderMap,
) -> Result<Json<UnitsReloaded>, ApiError> {
    if !state.auth.token_matches(bearer_token(&headers)) {
        return Err(ApiError::unauthorized());
    }

    let units = state.kitchen.reload_units().await?;
    Ok(Json(UnitsReloaded { units }))
}

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: &'static str,
    database: bool,
    subscribers: usize,
    stations_online: Vec<String>,
}

async fn health(State(state): State<RealtimeState>) -> impl IntoResponse {
    let database = state.kitchen.db().health_check().await;
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(Health {
            status: if database { "ok" } else { "degraded" },
            database,
            subscribers: state.hub.subscriber_count(),
            stations_online: state.hub.stations_online(),
        }),
    )
}
