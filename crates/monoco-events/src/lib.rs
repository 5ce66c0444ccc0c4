//! Monoco Events - Typed event bus for the scheduler core.
//!
//! This crate provides:
//! - The closed [`SchedulerEvent`] set and its [`EventKind`] discriminants
//! - A bounded publish/subscribe [`EventBus`] with per-kind subscriptions
//! - The [`Broadcaster`] projecting events to external consumers
//!
//! # Architecture
//!
//! Watchers and the scheduler publish events; handlers subscribe by kind.
//! Delivery is asynchronous: `publish` returns once the event is enqueued to
//! every matching subscription, not after handlers finish. Each subscription
//! drains its own channel in its own task, so one slow or failing handler
//! cannot stall the others.
//!
//! # Example
//!
//! ```rust
//! use monoco_events::{EventBus, EventKind, EventMetadata, SchedulerEvent};
//!
//! # async fn example() {
//! let bus = EventBus::new();
//! let mut issues = bus.subscribe(&[EventKind::IssueCreated]);
//!
//! bus.publish(SchedulerEvent::IssueCreated {
//!     metadata: EventMetadata::fresh(),
//!     issue_id: monoco_core::IssueId::from("FEAT-1"),
//!     stage: "todo".to_string(),
//!     path: "Issues/FEAT-1.md".into(),
//! })
//! .await;
//!
//! let event = issues.recv().await.unwrap();
//! assert_eq!(event.kind(), EventKind::IssueCreated);
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod broadcaster;
mod bus;
mod event;

pub use broadcaster::{BroadcastEnvelope, Broadcaster, ConnectionId};
pub use bus::{DEFAULT_BOUNDED_WAIT, DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use event::{EventKind, EventMetadata, MemoEntry, SchedulerEvent};
