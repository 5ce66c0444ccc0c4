//! Event handlers and their runner.
//!
//! Each handler subscribes to the event kinds it cares about and runs as a
//! single cooperative task. Decision logic is bounded in time (the runner
//! applies a timeout that does not count scheduled agent runtime, since
//! handlers only *start* sessions). A handler error is logged and published
//! as `SchedulerHandlerFailure`; it is never retried and never propagates to
//! other handlers.

mod architect;
mod coroner;
mod engineer;
mod mailbox_agent;
mod policy;
mod reviewer;

#[cfg(test)]
pub(crate) mod tests_support;

pub use architect::ArchitectHandler;
pub use coroner::CoronerHandler;
pub use engineer::EngineerHandler;
pub use mailbox_agent::MailboxAgentHandler;
pub use policy::HandoverPolicyHandler;
pub use reviewer::ReviewerHandler;

use async_trait::async_trait;
use monoco_events::{EventBus, EventKind, EventMetadata, SchedulerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default bound on handler decision time.
pub const DEFAULT_DECISION_TIMEOUT: Duration = Duration::from_secs(30);

/// A single-instance event consumer.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler name, for logs and failure events.
    fn name(&self) -> &'static str;

    /// Event kinds this handler subscribes to.
    fn interests(&self) -> &'static [EventKind];

    /// Process one event.
    async fn handle(&self, event: Arc<SchedulerEvent>) -> anyhow::Result<()>;
}

/// Run a handler against the bus until shutdown.
///
/// Returns the task handle so the daemon can await drain at shutdown.
pub fn spawn_handler(
    bus: &EventBus,
    handler: Arc<dyn EventHandler>,
    shutdown: CancellationToken,
    decision_timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    let mut events = bus.subscribe(handler.interests());
    let bus = bus.clone();

    tokio::spawn(async move {
        debug!(handler = handler.name(), "handler started");
        loop {
            let event = tokio::select! {
                () = shutdown.cancelled() => {
                    debug!(handler = handler.name(), "handler stopped by shutdown");
                    return;
                },
                event = events.recv() => match event {
                    Some(event) => event,
                    None => return,
                },
            };

            let outcome =
                tokio::time::timeout(decision_timeout, handler.handle(Arc::clone(&event))).await;
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(_) => format!("decision exceeded {decision_timeout:?}"),
            };

            warn!(
                handler = handler.name(),
                event_type = event.event_type(),
                error = %error,
                "handler failed"
            );
            bus.publish(SchedulerEvent::SchedulerHandlerFailure {
                metadata: EventMetadata::new(event.metadata().correlation_id.clone()),
                handler: handler.name().to_string(),
                error,
            })
            .await;
        }
    })
}
