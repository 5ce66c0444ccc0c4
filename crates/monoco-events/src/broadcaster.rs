//! External event projection.
//!
//! The broadcaster multiplexes a filtered projection of bus events to
//! external consumers (e.g. a web UI behind server-sent events). Each
//! connection owns a bounded ring; a consumer that stops draining is
//! disconnected rather than allowed to stall the core bus. No replay from
//! history is offered.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::bus::EventReceiver;
use crate::event::SchedulerEvent;

/// Default per-connection ring capacity.
const DEFAULT_CONNECTION_BUFFER: usize = 64;

/// Identifier of one broadcaster connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Wire envelope handed to external consumers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BroadcastEnvelope {
    /// Snake-case event type name.
    #[serde(rename = "type")]
    pub event_type: String,
    /// When the event was published.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Task-chain correlation id.
    pub correlation_id: String,
    /// Event fields, minus the metadata.
    pub payload: serde_json::Value,
}

impl BroadcastEnvelope {
    /// Project a scheduler event into the external envelope.
    #[must_use]
    pub fn project(event: &SchedulerEvent) -> Self {
        let metadata = event.metadata().clone();
        let mut payload = serde_json::to_value(event).unwrap_or(serde_json::Value::Null);
        if let serde_json::Value::Object(map) = &mut payload {
            map.remove("type");
            map.remove("metadata");
        }
        Self {
            event_type: event.event_type().to_string(),
            timestamp: metadata.timestamp,
            correlation_id: metadata.correlation_id.to_string(),
            payload,
        }
    }
}

struct Shared {
    connections: std::sync::Mutex<HashMap<ConnectionId, mpsc::Sender<BroadcastEnvelope>>>,
    next_id: AtomicU64,
    buffer: usize,
}

/// Fan-out of bus events to external consumers.
#[derive(Clone)]
pub struct Broadcaster {
    shared: Arc<Shared>,
}

impl Broadcaster {
    /// Create a broadcaster with the default per-connection buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_CONNECTION_BUFFER)
    }

    /// Create a broadcaster with an explicit per-connection buffer.
    #[must_use]
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                connections: std::sync::Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Attach a new consumer.
    ///
    /// The receiver yields envelopes until the consumer falls too far behind,
    /// at which point the channel closes — observing `None` is the
    /// disconnection signal.
    #[must_use]
    pub fn attach(&self) -> (ConnectionId, mpsc::Receiver<BroadcastEnvelope>) {
        let (tx, rx) = mpsc::channel(self.shared.buffer);
        let id = ConnectionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared
            .connections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, tx);
        debug!(connection = %id, "broadcast consumer attached");
        (id, rx)
    }

    /// Detach a consumer explicitly.
    pub fn detach(&self, id: ConnectionId) {
        if self
            .shared
            .connections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&id)
            .is_some()
        {
            debug!(connection = %id, "broadcast consumer detached");
        }
    }

    /// Number of attached consumers.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.shared
            .connections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Offer one envelope to every connection, disconnecting slow consumers.
    fn offer(&self, envelope: &BroadcastEnvelope) {
        let mut slow: Vec<ConnectionId> = Vec::new();
        {
            let connections = self
                .shared
                .connections
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for (id, tx) in connections.iter() {
                match tx.try_send(envelope.clone()) {
                    Ok(()) => {},
                    Err(mpsc::error::TrySendError::Full(_))
                    | Err(mpsc::error::TrySendError::Closed(_)) => slow.push(*id),
                }
            }
        }
        if !slow.is_empty() {
            let mut connections = self
                .shared
                .connections
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for id in slow {
                connections.remove(&id);
                warn!(connection = %id, "slow broadcast consumer disconnected");
            }
        }
    }

    /// Drain bus events into all connections until the bus closes.
    pub async fn run(self, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            self.offer(&BroadcastEnvelope::project(&event));
        }
        debug!("event bus closed, broadcaster stopping");
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("buffer", &self.shared.buffer)
            .field("connections", &self.connection_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::event::{EventMetadata, SchedulerEvent};
    use monoco_core::IssueId;

    fn event() -> SchedulerEvent {
        SchedulerEvent::IssueClosed {
            metadata: EventMetadata::fresh(),
            issue_id: IssueId::from("FEAT-1"),
        }
    }

    #[test]
    fn test_projection_shape() {
        let envelope = BroadcastEnvelope::project(&event());
        assert_eq!(envelope.event_type, "issue_closed");
        assert_eq!(envelope.payload["issue_id"], "FEAT-1");
        assert!(envelope.payload.get("metadata").is_none());
        assert!(envelope.payload.get("type").is_none());
    }

    #[tokio::test]
    async fn test_attach_receive_detach() {
        let broadcaster = Broadcaster::new();
        let (id, mut rx) = broadcaster.attach();
        assert_eq!(broadcaster.connection_count(), 1);

        broadcaster.offer(&BroadcastEnvelope::project(&event()));
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event_type, "issue_closed");

        broadcaster.detach(id);
        assert_eq!(broadcaster.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_consumer_disconnected() {
        let broadcaster = Broadcaster::with_buffer(1);
        let (_id, mut rx) = broadcaster.attach();

        // Fill the ring, then overflow it.
        broadcaster.offer(&BroadcastEnvelope::project(&event()));
        broadcaster.offer(&BroadcastEnvelope::project(&event()));
        assert_eq!(broadcaster.connection_count(), 0);

        // The consumer drains what it got, then observes disconnection.
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_run_forwards_bus_events() {
        let bus = EventBus::new();
        let broadcaster = Broadcaster::new();
        let (_id, mut rx) = broadcaster.attach();

        let forwarder = tokio::spawn(broadcaster.clone().run(bus.subscribe_all()));
        bus.publish(event()).await;

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event_type, "issue_closed");

        drop(bus);
        forwarder.await.unwrap();
    }
}
