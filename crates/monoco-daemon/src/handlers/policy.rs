//! Handover policy: direct Engineer→Reviewer handovers are disabled.
//!
//! The Reviewer only runs on `PrCreated`. Refusing explicit handover
//! requests here removes the feedback edge that produced swarm storms
//! (failed sessions spawning cascading re-runs).

use super::EventHandler;
use async_trait::async_trait;
use monoco_core::Role;
use monoco_events::{EventKind, SchedulerEvent};
use std::sync::Arc;
use tracing::{info, warn};

/// Refuses disabled handover edges; others are logged for the operator.
pub struct HandoverPolicyHandler;

#[async_trait]
impl EventHandler for HandoverPolicyHandler {
    fn name(&self) -> &'static str {
        "handover_policy"
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::HandoverRequested]
    }

    async fn handle(&self, event: Arc<SchedulerEvent>) -> anyhow::Result<()> {
        let SchedulerEvent::HandoverRequested {
            from_role,
            to_role,
            issue_id,
            ..
        } = event.as_ref()
        else {
            return Ok(());
        };

        if *from_role == Role::Engineer && *to_role == Role::Reviewer {
            warn!(
                ?issue_id,
                "engineer->reviewer handover is disabled; reviewer runs on pr_created only"
            );
            return Ok(());
        }

        info!(%from_role, %to_role, ?issue_id, "handover requested (no automatic action)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monoco_events::EventMetadata;

    #[tokio::test]
    async fn test_disabled_edge_is_a_quiet_no_op() {
        let handler = HandoverPolicyHandler;
        handler
            .handle(Arc::new(SchedulerEvent::HandoverRequested {
                metadata: EventMetadata::fresh(),
                from_role: Role::Engineer,
                to_role: Role::Reviewer,
                issue_id: Some(monoco_core::IssueId::from("FEAT-1")),
            }))
            .await
            .unwrap();
    }
}
