//! Engineer handler: issues entering `doing` get implemented.
//!
//! Deliberately does NOT chain into the Reviewer — review only runs on
//! `PrCreated`, which breaks the swarm-storm feedback loop.

use super::EventHandler;
use async_trait::async_trait;
use monoco_core::{AgentTask, Role};
use monoco_events::{EventKind, SchedulerEvent};
use monoco_scheduler::{AgentScheduler, SchedulerError};
use std::sync::Arc;
use tracing::{debug, info};

/// Stage that puts an issue on the Engineer's desk.
const DOING_STAGE: &str = "doing";

/// Schedules an Engineer session for issues that enter `doing`.
pub struct EngineerHandler {
    scheduler: Arc<dyn AgentScheduler>,
    engine: String,
}

impl EngineerHandler {
    /// Create the handler.
    #[must_use]
    pub fn new(scheduler: Arc<dyn AgentScheduler>, engine: String) -> Self {
        Self { scheduler, engine }
    }
}

#[async_trait]
impl EventHandler for EngineerHandler {
    fn name(&self) -> &'static str {
        "engineer"
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::IssueStageChanged]
    }

    async fn handle(&self, event: Arc<SchedulerEvent>) -> anyhow::Result<()> {
        let SchedulerEvent::IssueStageChanged {
            metadata,
            issue_id,
            to_stage,
            ..
        } = event.as_ref()
        else {
            return Ok(());
        };
        if to_stage != DOING_STAGE {
            return Ok(());
        }

        let prompt = format!(
            "You are the Engineer. Implement issue {issue_id} (now in stage \
             `doing`). Read the issue file under Issues/, implement the work \
             on a feature branch, and open a pull request when done."
        );
        let mut task = AgentTask::new(Role::Engineer, prompt, &self.engine)
            .with_issue(issue_id.clone());
        task.metadata.extra.insert(
            "correlation_id".to_string(),
            metadata.correlation_id.to_string(),
        );

        match self.scheduler.schedule(task).await {
            Ok(session_id) => {
                info!(%session_id, %issue_id, "engineer session scheduled");
                Ok(())
            },
            // The guard already published `SchedulerCooldown`; nothing to do
            // until a fresh stage-change arrives after expiry.
            Err(SchedulerError::CooldownActive { retry_after, .. }) => {
                debug!(%issue_id, ?retry_after, "engineer refused by cool-down");
                Ok(())
            },
            Err(e) => Err(e.into()),
        }
    }
}
