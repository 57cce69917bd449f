//! # SSE Adapter
//!
//! `GET /events?stationId=grill&token=...`: a one-way event stream for
//! stations that cannot hold a WebSocket open. Commands from these stations
//! arrive as HTTP POSTs and go through the same kitchen service.
//!
//! Token and `Origin` are checked before anything is registered:
//!
//! | Check              | Failure |
//! |--------------------|---------|
//! | shared token       | 401     |
//! | Origin allow-list  | 403     |
//! | station exists     | 404     |
//!
//! The first event on the stream is always `registered`.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::RealtimeError;
use crate::hub::{Subscription, TransportKind};
use crate::protocol::{ControlFrame, Registered, ServerFrame};
use crate::server::{bearer_token, RealtimeState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventsQuery {
    station_id: String,
    #[serde(default)]
    token: Option<String>,
}

pub(crate) async fn sse_handler(
    State(state): State<RealtimeState>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Response {
    let token = query.token.as_deref().or_else(|| bearer_token(&headers));
    if !state.auth.token_matches(token) {
        warn!(station_id = %query.station_id, "SSE token rejected");
        return RealtimeError::Unauthorized.into_response();
    }

    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    if !state.auth.origin_allowed(origin) {
        let origin = origin.unwrap_or_default().to_string();
        warn!(station_id = %query.station_id, origin = %origin, "SSE origin rejected");
        return RealtimeError::OriginRejected(origin).into_response();
    }

    let station = match state.kitchen.register_station(&query.station_id).await {
        Ok(station) => station,
        Err(e) => return e.into_response(),
    };

    let subscription = state.hub.register(&station, TransportKind::Sse);
    info!(station_id = %station.id, subscriber_id = %subscription.id(), "SSE stream opened");

    let registered = ServerFrame::Control(ControlFrame::Registered(Registered {
        station_id: station.id.clone(),
        kind: station.kind,
    }));

    Sse::new(event_stream(registered, subscription)).into_response()
}

/// `registered` first, then whatever the hub queues for this subscriber.
///
/// The stream ends when the hub drops the subscriber; dropping the stream
/// (client gone) unregisters it.
fn event_stream(
    first: ServerFrame,
    subscription: Subscription,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    let queued = stream::unfold(subscription, |mut subscription| async move {
        let frame = subscription.recv().await?;
        // a polled stream means the client is still reading
        subscription.handle().touch();
        Some((frame, subscription))
    });

    stream::once(async move { first })
        .chain(queued)
        .map(|frame| to_event(&frame))
}

fn to_event(frame: &ServerFrame) -> Result<Event, axum::Error> {
    Event::default().event(frame.name()).json_data(frame)
}
