//! Fan-out hub: tracks subscriber connections and broadcasts alert events.
//!
//! The subscriber set lives behind a single async lock; registration,
//! broadcast iteration and cleanup all happen under it. The hub does not
//! buffer for disconnected subscribers — missed events are lost.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

/// Outbound event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    EnvironmentalAlert,
    ZoneAlert,
    DeadAuvAlert,
    Echo,
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::EnvironmentalAlert => "environmental_alert",
            EventKind::ZoneAlert => "zone_alert",
            EventKind::DeadAuvAlert => "dead_auv_alert",
            EventKind::Echo => "echo",
            EventKind::Error => "error",
        }
    }
}

/// Wrap event data in the wire envelope sent to subscribers.
pub fn envelope(kind: EventKind, data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "type": kind.as_str(),
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// Destination for alert events; the hub in production, a recorder in tests.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn publish(&self, kind: EventKind, data: serde_json::Value);
}

// ------------------------------------------------------------------ //
//  FanoutHub                                                          //
// ------------------------------------------------------------------ //

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
pub struct FanoutHub {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Returns its id and the outbound frame stream;
    /// frames arrive in publish order (FIFO per subscriber).
    pub async fn connect(&self) -> (u64, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.lock().await;
        subscribers.push(Subscriber { id, tx });
        info!(id, total = subscribers.len(), "client connected");
        (id, rx)
    }

    pub async fn disconnect(&self, id: u64) {
        let mut subscribers = self.subscribers.lock().await;
        if let Some(pos) = subscribers.iter().position(|s| s.id == id) {
            subscribers.remove(pos);
            info!(id, remaining = subscribers.len(), "client disconnected");
        }
    }

    /// Broadcast one frame to every subscriber. Subscribers whose stream has
    /// gone away are removed before the lock is released.
    pub async fn broadcast(&self, frame: &serde_json::Value) {
        let text = frame.to_string();
        let mut subscribers = self.subscribers.lock().await;
        let mut dropped = Vec::new();
        for sub in subscribers.iter() {
            if sub.tx.send(text.clone()).is_err() {
                warn!(id = sub.id, "broadcast to subscriber failed");
                dropped.push(sub.id);
            }
        }
        if !dropped.is_empty() {
            subscribers.retain(|s| !dropped.contains(&s.id));
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

#[async_trait]
impl AlertSink for FanoutHub {
    async fn publish(&self, kind: EventKind, data: serde_json::Value) {
        self.broadcast(&envelope(kind, data)).await;
    }
}

// ------------------------------------------------------------------ //
//  RecordingSink (for tests)                                          //
// ------------------------------------------------------------------ //

/// In-memory sink that records published events for test assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<(EventKind, serde_json::Value)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume all events published so far.
    pub fn drain(&self) -> Vec<(EventKind, serde_json::Value)> {
        std::mem::take(&mut self.events.lock().unwrap())
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn publish(&self, kind: EventKind, data: serde_json::Value) {
        self.events.lock().unwrap().push((kind, data));
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let hub = FanoutHub::new();
        let (_a, mut rx_a) = hub.connect().await;
        let (_b, mut rx_b) = hub.connect().await;

        hub.publish(EventKind::ZoneAlert, json!({"zone_id": "Z1"})).await;

        for rx in [&mut rx_a, &mut rx_b] {
            let frame: serde_json::Value =
                serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(frame["type"], "zone_alert");
            assert_eq!(frame["data"]["zone_id"], "Z1");
            assert!(frame["timestamp"].is_string());
        }
    }

    #[tokio::test]
    async fn frames_are_fifo_per_subscriber() {
        let hub = FanoutHub::new();
        let (_id, mut rx) = hub.connect().await;

        for n in 0..3 {
            hub.publish(EventKind::DeadAuvAlert, json!({"n": n})).await;
        }
        for n in 0..3 {
            let frame: serde_json::Value =
                serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(frame["data"]["n"], n);
        }
    }

    #[tokio::test]
    async fn gone_subscriber_is_removed_on_broadcast() {
        let hub = FanoutHub::new();
        let (_kept, _rx_kept) = hub.connect().await;
        let (_gone, rx_gone) = hub.connect().await;
        drop(rx_gone);

        assert_eq!(hub.subscriber_count().await, 2);
        hub.publish(EventKind::EnvironmentalAlert, json!({})).await;
        assert_eq!(hub.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn disconnect_removes_subscriber() {
        let hub = FanoutHub::new();
        let (id, _rx) = hub.connect().await;
        hub.disconnect(id).await;
        assert_eq!(hub.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn recording_sink_captures_in_order() {
        let sink = RecordingSink::new();
        sink.publish(EventKind::EnvironmentalAlert, json!({"first": true})).await;
        sink.publish(EventKind::ZoneAlert, json!({"second": true})).await;

        let events = sink.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, EventKind::EnvironmentalAlert);
        assert_eq!(events[1].0, EventKind::ZoneAlert);
        assert!(sink.drain().is_empty());
    }
}
