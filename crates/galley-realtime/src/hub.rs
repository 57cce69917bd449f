//! # Station Hub
//!
//! Maps stations to their connected subscribers and fans kitchen events out to
//! them. Both transports register here; the kitchen service only ever sees
//! the [`EventPublisher`] trait.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Station Hub Architecture                         │
//! │                                                                         │
//! │  KitchenService ──publish(audience, event)──┐                          │
//! │                                              ▼                          │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  StationHub                                                     │   │
//! │  │  subscribers: DashMap<subscriber_id, Subscriber>                │   │
//! │  │                                                                 │   │
//! │  │   Audience::Station("grill") → subscribers of grill             │   │
//! │  │   Audience::Expo             → every expo subscriber            │   │
//! │  │   Audience::Everyone         → all subscribers                  │   │
//! │  └──────────┬───────────────────────┬───────────────────────┬──────┘   │
//! │             │ try_send              │ try_send              │          │
//! │       ┌─────▼─────┐           ┌─────▼─────┐           ┌─────▼─────┐    │
//! │       │ mpsc (64) │           │ mpsc (64) │           │ mpsc (64) │    │
//! │       │ WS writer │           │ SSE stream│           │ WS writer │    │
//! │       └───────────┘           └───────────┘           └───────────┘    │
//! │                                                                         │
//! │  Heartbeat task: every interval                                         │
//! │   1. drop subscribers silent for more than two windows                 │
//! │   2. queue a heartbeat frame for everyone left                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is best-effort: a subscriber whose queue is full loses that event
//! and recovers through the catch-up queries on its next reconnect.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use galley_core::{KitchenEvent, Station, StationKind};

use crate::config::HubSettings;
use crate::protocol::ServerFrame;

// =============================================================================
// Publish Interface
// =============================================================================

/// Who receives a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Subscribers registered as this station.
    Station(String),
    /// Every expo subscriber.
    Expo,
    /// Every subscriber.
    Everyone,
}

impl Audience {
    fn includes(&self, station_id: &str, kind: StationKind) -> bool {
        match self {
            Audience::Station(id) => id == station_id,
            Audience::Expo => kind == StationKind::Expo,
            Audience::Everyone => true,
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::Station(id) => write!(f, "station:{id}"),
            Audience::Expo => write!(f, "expo"),
            Audience::Everyone => write!(f, "everyone"),
        }
    }
}

/// Publishes kitchen events to station subscribers.
pub trait EventPublisher: Send + Sync {
    /// Queues `event` for every subscriber in `audience`.
    ///
    /// Returns the number of subscribers that accepted it.
    fn publish(&self, audience: Audience, event: KitchenEvent) -> usize;
}

// =============================================================================
// Subscribers
// =============================================================================

/// Transport a subscriber is connected through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    Sse,
}

impl TransportKind {
    /// The other transport.
    pub fn other(&self) -> Self {
        match self {
            TransportKind::WebSocket => TransportKind::Sse,
            TransportKind::Sse => TransportKind::WebSocket,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebSocket => write!(f, "websocket"),
            TransportKind::Sse => write!(f, "sse"),
        }
    }
}

struct Subscriber {
    station_id: String,
    kind: StationKind,
    transport: TransportKind,
    tx: mpsc::Sender<ServerFrame>,
    /// Milliseconds since the hub epoch.
    last_seen: AtomicU64,
}

struct HubInner {
    subscribers: DashMap<String, Subscriber>,
    queue_capacity: usize,
    heartbeat_interval: Duration,
    epoch: Instant,
    /// Set by `close_all`; later registrations get an already-closed queue.
    closed: AtomicBool,
}

impl HubInner {
    fn millis_since_epoch(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.epoch).as_millis() as u64
    }
}

/// Registry of connected station subscribers. Cheap to clone.
#[derive(Clone)]
pub struct StationHub {
    inner: Arc<HubInner>,
}

impl StationHub {
    pub fn new(settings: &HubSettings) -> Self {
        StationHub {
            inner: Arc::new(HubInner {
                subscribers: DashMap::new(),
                queue_capacity: settings.queue_capacity,
                heartbeat_interval: settings.heartbeat_interval(),
                epoch: Instant::now(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribes a connection as `station`.
    ///
    /// Dropping the returned [`Subscription`] unregisters it.
    pub fn register(&self, station: &Station, transport: TransportKind) -> Subscription {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.inner.queue_capacity);
        let subscription = Subscription {
            handle: SubscriberHandle {
                id: id.clone(),
                hub: self.clone(),
            },
            station: station.clone(),
            rx,
        };

        if self.is_closed() {
            debug!(station_id = %station.id, "Hub closed, subscription refused");
            return subscription;
        }

        self.inner.subscribers.insert(
            id.clone(),
            Subscriber {
                station_id: station.id.clone(),
                kind: station.kind,
                transport,
                tx,
                last_seen: AtomicU64::new(self.inner.millis_since_epoch(Instant::now())),
            },
        );

        info!(
            subscriber_id = %id,
            station_id = %station.id,
            kind = station.kind.as_str(),
            %transport,
            "Station subscribed"
        );

        // lost a race with close_all
        if self.is_closed() {
            self.unregister(&id);
        }
        subscription
    }

    /// Closes every subscriber queue so their streams end, and refuses new
    /// subscriptions. Used on shutdown. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        self.inner.closed.store(true, Ordering::SeqCst);

        let ids: Vec<String> = self
            .inner
            .subscribers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let closed = ids.iter().filter(|id| self.unregister(id)).count();
        info!(closed, "Station hub closed");
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Records activity from a subscriber.
    pub fn touch(&self, subscriber_id: &str) {
        if let Some(sub) = self.inner.subscribers.get(subscriber_id) {
            sub.last_seen
                .store(self.inner.millis_since_epoch(Instant::now()), Ordering::Relaxed);
        }
    }

    /// Removes a subscriber, closing its queue.
    pub fn unregister(&self, subscriber_id: &str) -> bool {
        match self.inner.subscribers.remove(subscriber_id) {
            Some((_, sub)) => {
                info!(
                    subscriber_id = %subscriber_id,
                    station_id = %sub.station_id,
                    transport = %sub.transport,
                    "Station unsubscribed"
                );
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Ids of stations with at least one subscriber, sorted.
    pub fn stations_online(&self) -> Vec<String> {
        let mut stations: Vec<String> = self
            .inner
            .subscribers
            .iter()
            .map(|entry| entry.station_id.clone())
            .collect();
        stations.sort();
        stations.dedup();
        stations
    }

    /// Queues a frame for one subscriber (command replies).
    pub fn send_to(&self, subscriber_id: &str, frame: ServerFrame) -> bool {
        match self.inner.subscribers.get(subscriber_id) {
            Some(sub) => sub.tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Queues a frame for every subscriber in `audience`.
    pub fn deliver(&self, audience: &Audience, frame: &ServerFrame) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.inner.subscribers.iter() {
            let sub = entry.value();
            if !audience.includes(&sub.station_id, sub.kind) {
                continue;
            }
            match sub.tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        subscriber_id = %entry.key(),
                        station_id = %sub.station_id,
                        event = frame.name(),
                        "Subscriber queue full, event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(entry.key().clone()),
            }
        }

        // removal must wait until the iterator releases its shard locks
        for id in closed {
            self.unregister(&id);
        }

        delivered
    }

    /// Removes subscribers silent for more than two heartbeat windows.
    pub fn reap_idle(&self, now: Instant) -> usize {
        let limit = (self.inner.heartbeat_interval * 2).as_millis() as u64;
        let now_ms = self.inner.millis_since_epoch(now);

        let idle: Vec<String> = self
            .inner
            .subscribers
            .iter()
            .filter(|entry| now_ms.saturating_sub(entry.last_seen.load(Ordering::Relaxed)) > limit)
            .map(|entry| entry.key().clone())
            .collect();

        for id in &idle {
            warn!(subscriber_id = %id, "Subscriber missed heartbeats, dropping");
            self.unregister(id);
        }
        idle.len()
    }

    /// One heartbeat round: reap, then ping everyone left.
    pub fn heartbeat(&self) -> usize {
        let reaped = self.reap_idle(Instant::now());
        let sent = self.deliver(&Audience::Everyone, &ServerFrame::heartbeat(Utc::now()));
        debug!(sent, reaped, "Heartbeat");
        sent
    }

    /// Spawns the heartbeat loop. Abort the handle to stop it.
    pub fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let hub = self.clone();
        let period = self.inner.heartbeat_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(?period, "Heartbeat loop started");
            loop {
                ticker.tick().await;
                hub.heartbeat();
            }
        })
    }
}

impl EventPublisher for StationHub {
    fn publish(&self, audience: Audience, event: KitchenEvent) -> usize {
        let name = event.name();
        let delivered = self.deliver(&audience, &ServerFrame::Kitchen(event));
        debug!(event = name, %audience, delivered, "Event published");
        delivered
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Cloneable reference to a registered subscriber.
#[derive(Clone)]
pub struct SubscriberHandle {
    id: String,
    hub: StationHub,
}

impl SubscriberHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn touch(&self) {
        self.hub.touch(&self.id);
    }

    /// Queues a frame for this subscriber only.
    pub fn reply(&self, frame: ServerFrame) -> bool {
        self.hub.send_to(&self.id, frame)
    }
}

/// A registered connection's inbound queue.
pub struct Subscription {
    handle: SubscriberHandle,
    station: Station,
    rx: mpsc::Receiver<ServerFrame>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.handle.id
    }

    pub fn station(&self) -> &Station {
        &self.station
    }

    pub fn handle(&self) -> SubscriberHandle {
        self.handle.clone()
    }

    /// Next queued frame; `None` once the hub dropped this subscriber.
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.hub.unregister(&self.handle.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_core::events::OrderRef;

    fn station(id: &str, kind: StationKind) -> Station {
        Station {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            order_type_filter: None,
        }
    }

    fn hub(queue_capacity: usize) -> StationHub {
        StationHub::new(&HubSettings {
            heartbeat_interval_secs: 10,
            queue_capacity,
        })
    }

    fn completed() -> KitchenEvent {
        KitchenEvent::OrderCompleted(OrderRef {
            order_id: "o-1".to_string(),
            order_number: "1".to_string(),
        })
    }

    #[tokio::test]
    async fn test_audience_routing() {
        let hub = hub(8);
        let mut grill = hub.register(&station("grill", StationKind::Prep), TransportKind::WebSocket);
        let mut expo = hub.register(&station("expo", StationKind::Expo), TransportKind::Sse);

        assert_eq!(hub.publish(Audience::Station("grill".into()), KitchenEvent::ReportsUpdated), 1);
        assert_eq!(hub.publish(Audience::Expo, completed()), 1);
        assert_eq!(hub.publish(Audience::Everyone, KitchenEvent::ReportsUpdated), 2);

        assert_eq!(grill.recv().await.unwrap().name(), "reportsUpdated");
        assert_eq!(grill.recv().await.unwrap().name(), "reportsUpdated");
        assert_eq!(expo.recv().await.unwrap().name(), "orderCompleted");
        assert_eq!(expo.recv().await.unwrap().name(), "reportsUpdated");
    }

    #[tokio::test]
    async fn test_full_queue_drops_event_for_that_subscriber_only() {
        let hub = hub(1);
        let mut slow = hub.register(&station("grill", StationKind::Prep), TransportKind::WebSocket);
        let mut fast = hub.register(&station("fry", StationKind::Prep), TransportKind::WebSocket);

        assert_eq!(hub.publish(Audience::Everyone, KitchenEvent::ReportsUpdated), 2);
        assert!(fast.recv().await.is_some());

        // slow never drained its single slot
        assert_eq!(hub.publish(Audience::Everyone, completed()), 1);
        assert_eq!(hub.subscriber_count(), 2);

        assert_eq!(slow.recv().await.unwrap().name(), "reportsUpdated");
        assert_eq!(fast.recv().await.unwrap().name(), "orderCompleted");
    }

    #[tokio::test]
    async fn test_drop_unregisters() {
        let hub = hub(8);
        let sub = hub.register(&station("grill", StationKind::Prep), TransportKind::WebSocket);
        let other = hub.register(&station("grill", StationKind::Prep), TransportKind::Sse);
        assert_eq!(hub.subscriber_count(), 2);
        assert_eq!(hub.stations_online(), vec!["grill"]);

        drop(sub);
        assert_eq!(hub.subscriber_count(), 1);
        drop(other);
        assert!(hub.stations_online().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_subscribers_are_reaped() {
        let hub = hub(8);
        let mut quiet = hub.register(&station("grill", StationKind::Prep), TransportKind::WebSocket);
        let chatty = hub.register(&station("expo", StationKind::Expo), TransportKind::WebSocket);

        tokio::time::advance(Duration::from_secs(15)).await;
        chatty.handle().touch();
        assert_eq!(hub.reap_idle(Instant::now()), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(hub.reap_idle(Instant::now()), 1);
        assert_eq!(hub.stations_online(), vec!["expo"]);

        // the reaped connection sees its queue close
        assert!(quiet.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_reply_reaches_only_one_subscriber() {
        let hub = hub(8);
        let mut a = hub.register(&station("grill", StationKind::Prep), TransportKind::WebSocket);
        let b = hub.register(&station("grill", StationKind::Prep), TransportKind::WebSocket);

        assert!(a.handle().reply(ServerFrame::error("NOT_FOUND", "gone")));
        assert_eq!(a.recv().await.unwrap().name(), "error");
        assert!(!hub.send_to("nobody", ServerFrame::error("X", "y")));
        drop(b);
    }

    #[test]
    fn test_transport_kind_other() {
        assert_eq!(TransportKind::WebSocket.other(), TransportKind::Sse);
        assert_eq!(TransportKind::Sse.to_string(), "sse");
    }

    #[tokio::test]
    async fn test_close_all_ends_every_stream() {
        let hub = hub(8);
        let mut grill = hub.register(&station("grill", StationKind::Prep), TransportKind::Sse);
        let mut expo = hub.register(&station("expo", StationKind::Expo), TransportKind::WebSocket);

        assert_eq!(hub.close_all(), 2);
        assert!(hub.is_closed());
        assert_eq!(hub.subscriber_count(), 0);
        assert!(grill.recv().await.is_none());
        assert!(expo.recv().await.is_none());

        let mut late = hub.register(&station("fry", StationKind::Prep), TransportKind::Sse);
        assert!(late.recv().await.is_none());
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(Audience::Everyone, KitchenEvent::ReportsUpdated), 0);
    }
}
