//! SSE broadcast hub
//!
//! Membership is serialized through a single coordinator task that owns
//! the subscriber map exclusively; register, unregister and broadcast
//! all flow through channels, so fan-out never contends with
//! connect/disconnect churn on a lock. Each subscriber owns a small
//! bounded queue: a slow subscriber drops events independently without
//! blocking the coordinator or other subscribers.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::Utc;
use futures::stream::Stream;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::events::SseEvent;

/// Events queued for the coordinator before fan-out.
const BROADCAST_CAPACITY: usize = 100;
/// Per-subscriber outbound queue.
const CLIENT_QUEUE_CAPACITY: usize = 10;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

struct Registration {
    id: u64,
    tx: mpsc::Sender<SseEvent>,
}

/// Sends the unregister message exactly once, when the subscription is
/// dropped (stream ended or transport cancelled).
struct UnregisterGuard {
    id: u64,
    tx: mpsc::UnboundedSender<u64>,
}

impl Drop for UnregisterGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(self.id);
    }
}

/// A live subscription to the hub's event stream.
pub struct Subscription {
    pub id: u64,
    rx: mpsc::Receiver<SseEvent>,
    _guard: UnregisterGuard,
}

impl Subscription {
    /// Next delivered event; `None` once the hub has dropped this
    /// subscriber.
    pub async fn recv(&mut self) -> Option<SseEvent> {
        self.rx.recv().await
    }
}

/// Handle for broadcasting and subscribing. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::UnboundedSender<u64>,
    broadcast_tx: mpsc::Sender<SseEvent>,
    client_count: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
}

impl Hub {
    /// Create the hub handle and its coordinator. The coordinator must
    /// be spawned explicitly (`tokio::spawn(coordinator.run())`).
    pub fn new() -> (Hub, HubCoordinator) {
        let (register_tx, register_rx) = mpsc::channel(16);
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_CAPACITY);
        let client_count = Arc::new(AtomicUsize::new(0));

        let hub = Hub {
            register_tx,
            unregister_tx,
            broadcast_tx,
            client_count: client_count.clone(),
            next_id: Arc::new(AtomicU64::new(0)),
        };
        let coordinator = HubCoordinator {
            register_rx,
            unregister_rx,
            broadcast_rx,
            client_count,
        };
        (hub, coordinator)
    }

    /// Enqueue an event for delivery to all current subscribers.
    ///
    /// Non-blocking: when the dispatch queue is full the event is
    /// dropped and reported, not retried.
    pub fn broadcast_update(&self, event: &str, data: serde_json::Value) {
        match self.broadcast_tx.try_send(SseEvent::new(event, data)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                error!("SSE broadcast channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("SSE hub coordinator stopped, dropping event");
            }
        }
    }

    pub fn connected_clients(&self) -> usize {
        self.client_count.load(Ordering::SeqCst)
    }

    /// Register a new subscriber with the coordinator.
    pub async fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        let _ = self.register_tx.send(Registration { id, tx }).await;
        Subscription {
            id,
            rx,
            _guard: UnregisterGuard {
                id,
                tx: self.unregister_tx.clone(),
            },
        }
    }

    /// Axum handler body for a long-lived SSE connection: streams the
    /// `connected` acknowledgement, then delivered events, with a
    /// periodic heartbeat multiplexed into the same loop.
    pub async fn handle_sse(&self) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        let mut subscription = self.subscribe().await;
        info!(
            client = subscription.id,
            "new SSE client connected, total clients: {}",
            self.connected_clients() + 1
        );

        let stream = async_stream::stream! {
            yield Ok(Event::default()
                .event("connected")
                .data(json!({"id": subscription.id}).to_string()));

            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;

            loop {
                tokio::select! {
                    delivered = subscription.recv() => {
                        match delivered {
                            Some(event) => {
                                yield Ok(Event::default()
                                    .event(&event.event)
                                    .data(event.data.to_string()));
                            }
                            // Hub dropped this subscriber.
                            None => break,
                        }
                    }
                    _ = heartbeat.tick() => {
                        yield Ok(Event::default()
                            .event("heartbeat")
                            .data(json!({"time": Utc::now().timestamp()}).to_string()));
                    }
                }
            }
        };

        Sse::new(stream).keep_alive(
            KeepAlive::new()
                .interval(HEARTBEAT_INTERVAL)
                .text("keep-alive"),
        )
    }
}

/// Owns the subscriber map; the only task that touches membership.
pub struct HubCoordinator {
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::UnboundedReceiver<u64>,
    broadcast_rx: mpsc::Receiver<SseEvent>,
    client_count: Arc<AtomicUsize>,
}

impl HubCoordinator {
    /// Coordinating loop: register/unregister/broadcast, event-driven.
    pub async fn run(mut self) {
        let mut clients: HashMap<u64, mpsc::Sender<SseEvent>> = HashMap::new();

        loop {
            tokio::select! {
                registration = self.register_rx.recv() => {
                    let Some(Registration { id, tx }) = registration else { break };
                    clients.insert(id, tx);
                    self.client_count.store(clients.len(), Ordering::SeqCst);
                    info!(client = id, "SSE client registered");
                }
                unregistered = self.unregister_rx.recv() => {
                    let Some(id) = unregistered else { break };
                    if clients.remove(&id).is_some() {
                        self.client_count.store(clients.len(), Ordering::SeqCst);
                        info!(client = id, "SSE client unregistered");
                    }
                }
                event = self.broadcast_rx.recv() => {
                    let Some(event) = event else { break };
                    for (id, tx) in &clients {
                        // Independent backpressure: a full queue drops
                        // this event for this subscriber only.
                        if tx.try_send(event.clone()).is_err() {
                            debug!(client = id, "SSE client queue full, skipping event");
                        }
                    }
                }
            }
        }
    }
}
