//! Bounded publish/subscribe bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::event::{EventKind, EventMetadata, SchedulerEvent};

/// Default per-subscription queue capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default bounded wait before a full subscription queue drops a delivery.
pub const DEFAULT_BOUNDED_WAIT: Duration = Duration::from_millis(250);

struct Subscription {
    id: u64,
    /// `None` subscribes to every kind.
    kinds: Option<Vec<EventKind>>,
    tx: mpsc::Sender<Arc<SchedulerEvent>>,
}

impl Subscription {
    fn matches(&self, kind: EventKind) -> bool {
        self.kinds.as_ref().is_none_or(|kinds| kinds.contains(&kind))
    }
}

struct Inner {
    subscriptions: std::sync::RwLock<Vec<Subscription>>,
    capacity: usize,
    bounded_wait: Duration,
    next_id: AtomicU64,
}

/// Typed event bus with per-kind subscriptions.
///
/// `publish` returns after the event has been enqueued to every matching
/// subscription. Each subscription owns a bounded queue; when a queue stays
/// full past the bounded wait the delivery is dropped, logged, and a
/// synthetic [`SchedulerEvent::SchedulerOverload`] is published so the loss
/// is observable. Events enqueue in publish order, so delivery per kind is
/// FIFO for every subscriber.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Create a bus with default capacity and bounded wait.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY, DEFAULT_BOUNDED_WAIT)
    }

    /// Create a bus with explicit per-subscription capacity and bounded wait.
    #[must_use]
    pub fn with_capacity(capacity: usize, bounded_wait: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscriptions: std::sync::RwLock::new(Vec::new()),
                capacity: capacity.max(1),
                bounded_wait,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to the given event kinds.
    #[must_use]
    pub fn subscribe(&self, kinds: &[EventKind]) -> EventReceiver {
        self.add_subscription(Some(kinds.to_vec()))
    }

    /// Subscribe to every event kind.
    #[must_use]
    pub fn subscribe_all(&self) -> EventReceiver {
        self.add_subscription(None)
    }

    fn add_subscription(&self, kinds: Option<Vec<EventKind>>) -> EventReceiver {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscriptions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Subscription { id, kinds, tx });
        EventReceiver { rx }
    }

    /// Publish an event to all matching subscriptions.
    ///
    /// Returns the number of subscriptions the event was enqueued to.
    pub async fn publish(&self, event: SchedulerEvent) -> usize {
        let event = Arc::new(event);
        trace!(event_type = %event.event_type(), "publishing event");

        let (delivered, dropped) = self.deliver(&event).await;

        if dropped > 0 && event.kind() != EventKind::SchedulerOverload {
            let overload = Arc::new(SchedulerEvent::SchedulerOverload {
                metadata: EventMetadata::new(event.metadata().correlation_id.clone()),
                dropped,
            });
            // Best effort: drops of the overload event itself are only logged.
            let _ = self.deliver(&overload).await;
        }

        delivered
    }

    /// Enqueue to matching subscriptions; returns (delivered, dropped) counts.
    async fn deliver(&self, event: &Arc<SchedulerEvent>) -> (usize, usize) {
        let kind = event.kind();
        let targets: Vec<(u64, mpsc::Sender<Arc<SchedulerEvent>>)> = {
            let subscriptions = self
                .inner
                .subscriptions
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            subscriptions
                .iter()
                .filter(|s| s.matches(kind))
                .map(|s| (s.id, s.tx.clone()))
                .collect()
        };

        let mut delivered: usize = 0;
        let mut dropped: usize = 0;
        let mut closed: Vec<u64> = Vec::new();

        for (id, tx) in targets {
            match tokio::time::timeout(self.inner.bounded_wait, tx.send(Arc::clone(event))).await {
                Ok(Ok(())) => delivered = delivered.saturating_add(1),
                Ok(Err(_)) => closed.push(id),
                Err(_) => {
                    dropped = dropped.saturating_add(1);
                    warn!(
                        event_type = %event.event_type(),
                        subscription = id,
                        "subscription queue full, event dropped"
                    );
                },
            }
        }

        if !closed.is_empty() {
            let mut subscriptions = self
                .inner
                .subscriptions
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            subscriptions.retain(|s| !closed.contains(&s.id));
            debug!(removed = closed.len(), "removed closed subscriptions");
        }

        (delivered, dropped)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscriptions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Per-subscription queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.inner.capacity)
            .field("subscriptions", &self.subscriber_count())
            .finish()
    }
}

/// Receiving side of one subscription.
pub struct EventReceiver {
    rx: mpsc::Receiver<Arc<SchedulerEvent>>,
}

impl EventReceiver {
    /// Receive the next event; `None` when the bus is gone.
    pub async fn recv(&mut self) -> Option<Arc<SchedulerEvent>> {
        self.rx.recv().await
    }

    /// Receive without blocking; `None` if empty or closed.
    pub fn try_recv(&mut self) -> Option<Arc<SchedulerEvent>> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monoco_core::IssueId;

    fn issue_created(id: &str) -> SchedulerEvent {
        SchedulerEvent::IssueCreated {
            metadata: EventMetadata::fresh(),
            issue_id: IssueId::from(id),
            stage: "todo".to_string(),
            path: format!("Issues/{id}.md").into(),
        }
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(&[EventKind::IssueCreated]);

        let enqueued = bus.publish(issue_created("FEAT-1")).await;
        assert_eq!(enqueued, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), EventKind::IssueCreated);
    }

    #[tokio::test]
    async fn test_kind_filter() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(&[EventKind::IssueClosed]);

        bus.publish(issue_created("FEAT-1")).await;
        assert!(rx.try_recv().is_none());

        bus.publish(SchedulerEvent::IssueClosed {
            metadata: EventMetadata::fresh(),
            issue_id: IssueId::from("FEAT-1"),
        })
        .await;
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_subscribe_all_sees_everything() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_all();

        bus.publish(issue_created("FEAT-1")).await;
        bus.publish(SchedulerEvent::IssueClosed {
            metadata: EventMetadata::fresh(),
            issue_id: IssueId::from("FEAT-1"),
        })
        .await;

        assert_eq!(rx.recv().await.unwrap().kind(), EventKind::IssueCreated);
        assert_eq!(rx.recv().await.unwrap().kind(), EventKind::IssueClosed);
    }

    #[tokio::test]
    async fn test_per_kind_fifo_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(&[EventKind::IssueCreated]);

        for i in 0..10 {
            bus.publish(issue_created(&format!("FEAT-{i}"))).await;
        }
        for i in 0..10 {
            let event = rx.recv().await.unwrap();
            let SchedulerEvent::IssueCreated { issue_id, .. } = event.as_ref() else {
                panic!("wrong event kind");
            };
            assert_eq!(issue_id.as_str(), format!("FEAT-{i}"));
        }
    }

    #[tokio::test]
    async fn test_no_subscribers() {
        let bus = EventBus::new();
        let enqueued = bus.publish(issue_created("FEAT-1")).await;
        assert_eq!(enqueued, 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_emits_overload() {
        // Capacity 1, no grace: the second publish to the stalled subscriber
        // must drop and surface an overload event to the healthy subscriber.
        let bus = EventBus::with_capacity(1, Duration::from_millis(10));
        let _stalled = bus.subscribe(&[EventKind::IssueCreated]);
        let mut health = bus.subscribe(&[EventKind::SchedulerOverload]);

        bus.publish(issue_created("FEAT-1")).await;
        bus.publish(issue_created("FEAT-2")).await;

        let event = health.recv().await.unwrap();
        let SchedulerEvent::SchedulerOverload { dropped, .. } = event.as_ref() else {
            panic!("expected overload event");
        };
        assert_eq!(*dropped, 1);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe(&[EventKind::IssueCreated]);
        assert_eq!(bus.subscriber_count(), 1);

        drop(rx);
        bus.publish(issue_created("FEAT-1")).await;
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block_others() {
        let bus = EventBus::with_capacity(1, Duration::from_millis(10));
        let _stalled = bus.subscribe(&[EventKind::IssueCreated]);
        let mut healthy = bus.subscribe(&[EventKind::IssueCreated]);

        bus.publish(issue_created("FEAT-1")).await;
        bus.publish(issue_created("FEAT-2")).await;

        // The healthy subscriber got the first event; the second was consumed
        // into its queue as well since its queue had room after draining.
        assert!(healthy.recv().await.is_some());
    }
}
