//! # WebSocket Adapter
//!
//! `GET /ws`: a bidirectional station connection.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        WebSocket Connection                             │
//! │                                                                         │
//! │  upgrade ─► Origin allowed? ──no──► 403                                │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │  wait for `register` (10s)   commands before it: dropped + warn        │
//! │                 │                                                       │
//! │  token ok? station known? ──no──► error frame, close                   │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │  hub.register() → `registered` frame                                   │
//! │                 │                                                       │
//! │     ┌───────────┴────────────┐                                         │
//! │     ▼                        ▼                                         │
//! │  writer task              reader loop                                  │
//! │  queue → socket           frame → touch → command → ack/error          │
//! │     │                        │                                         │
//! │     └──── either ends ───────┴──► unregister, close                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use galley_core::Station;

use crate::error::{RealtimeError, RealtimeResult};
use crate::hub::{SubscriberHandle, TransportKind};
use crate::protocol::{ClientFrame, CommandAck, ControlFrame, Registered, ServerFrame};
use crate::server::RealtimeState;

/// How long a new connection has to send `register`.
const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum inbound frame size.
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<RealtimeState>,
    headers: HeaderMap,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    if !state.auth.origin_allowed(origin) {
        let origin = origin.unwrap_or_default().to_string();
        warn!(origin = %origin, "WebSocket origin rejected");
        return RealtimeError::OriginRejected(origin).into_response();
    }

    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: RealtimeState) {
    let (mut sender, mut receiver) = socket.split();

    let (station_id, token) = match receive_register(&mut receiver).await {
        Ok(register) => register,
        Err(e) => {
            warn!(error = %e, "No register frame, closing connection");
            return;
        }
    };

    let station = match authenticate(&state, &station_id, token.as_deref()).await {
        Ok(station) => station,
        Err(e) => {
            warn!(station_id = %station_id, error = %e, "Station registration rejected");
            let _ = send_frame(&mut sender, &ServerFrame::from_error(&e)).await;
            let _ = sender.close().await;
            return;
        }
    };

    let mut subscription = state.hub.register(&station, TransportKind::WebSocket);
    let handle = subscription.handle();

    let registered = ServerFrame::Control(ControlFrame::Registered(Registered {
        station_id: station.id.clone(),
        kind: station.kind,
    }));
    if let Err(e) = send_frame(&mut sender, &registered).await {
        warn!(station_id = %station.id, error = %e, "Failed to send registered frame");
        return;
    }

    // The subscription lives in the writer; when the hub drops it the queue
    // closes and the writer ends the connection.
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = subscription.recv().await {
            if let Err(e) = send_frame(&mut sender, &frame).await {
                debug!(subscriber_id = %subscription.id(), error = %e, "Socket write failed");
                break;
            }
        }
        let _ = sender.close().await;
    });

    let reader = read_loop(&state, &station, &handle, &mut receiver);

    tokio::select! {
        _ = reader => {
            writer.abort();
        }
        _ = &mut writer => {
            debug!(station_id = %station.id, "Writer ended");
        }
    }

    info!(station_id = %station.id, subscriber_id = %handle.id(), "WebSocket connection closed");
}

/// Reads frames until the peer goes away.
async fn read_loop(
    state: &RealtimeState,
    station: &Station,
    handle: &SubscriberHandle,
    receiver: &mut SplitStream<WebSocket>,
) {
    while let Some(message) = receiver.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Binary(data)) => String::from_utf8_lossy(&data).to_string(),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                handle.touch();
                continue;
            }
            Ok(Message::Close(_)) => {
                debug!(station_id = %station.id, "Station requested close");
                break;
            }
            Err(e) => {
                warn!(station_id = %station.id, error = %e, "WebSocket error");
                break;
            }
        };

        handle.touch();

        let frame = match ClientFrame::from_json(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(station_id = %station.id, error = %e, "Invalid frame");
                handle.reply(ServerFrame::from_error(&e));
                continue;
            }
        };

        match frame.command() {
            Some((command, order_id)) => {
                let reply = match state.kitchen.execute(station, command, order_id).await {
                    Ok(_) => ServerFrame::Control(ControlFrame::Ack(CommandAck {
                        command,
                        order_id: order_id.to_string(),
                    })),
                    Err(e) => {
                        debug!(station_id = %station.id, order_id = %order_id, error = %e, "Command failed");
                        ServerFrame::from_error(&e)
                    }
                };
                handle.reply(reply);
            }
            None if matches!(frame, ClientFrame::Register { .. }) => {
                handle.reply(ServerFrame::from_error(&RealtimeError::InvalidMessage(
                    "connection already registered".to_string(),
                )));
            }
            None => {}
        }
    }
}

/// Waits for the `register` frame, dropping anything sent before it.
async fn receive_register(
    receiver: &mut SplitStream<WebSocket>,
) -> RealtimeResult<(String, Option<String>)> {
    let wait = async {
        while let Some(message) = receiver.next().await {
            let message = message.map_err(|e| RealtimeError::WebSocketError(e.to_string()))?;
            let text = match message {
                Message::Text(text) => text.to_string(),
                Message::Binary(data) => String::from_utf8_lossy(&data).to_string(),
                Message::Close(_) => return Err(RealtimeError::Disconnected),
                Message::Ping(_) | Message::Pong(_) => continue,
            };

            match ClientFrame::from_json(&text) {
                Ok(ClientFrame::Register { station_id, token }) => return Ok((station_id, token)),
                Ok(frame) => {
                    if let Some((command, order_id)) = frame.command() {
                        warn!(%command, order_id = %order_id, "Command from unregistered connection dropped");
                    }
                }
                Err(e) => debug!(error = %e, "Invalid frame before register"),
            }
        }
        Err(RealtimeError::Disconnected)
    };

    tokio::time::timeout(REGISTER_TIMEOUT, wait)
        .await
        .map_err(|_| RealtimeError::Timeout(REGISTER_TIMEOUT.as_secs()))?
}

async fn authenticate(
    state: &RealtimeState,
    station_id: &str,
    token: Option<&str>,
) -> RealtimeResult<Station> {
    if !state.auth.token_matches(token) {
        return Err(RealtimeError::Unauthorized);
    }
    state.kitchen.register_station(station_id).await
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> RealtimeResult<()> {
    let json = frame.to_json()?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| RealtimeError::WebSocketError(e.to_string()))
}
