//! Reviewer handler: pull requests get reviewed.

use super::EventHandler;
use async_trait::async_trait;
use monoco_core::{AgentTask, Role};
use monoco_events::{EventKind, SchedulerEvent};
use monoco_scheduler::AgentScheduler;
use std::sync::Arc;
use tracing::info;

/// Schedules a Reviewer session on `PrCreated`.
pub struct ReviewerHandler {
    scheduler: Arc<dyn AgentScheduler>,
    engine: String,
}

impl ReviewerHandler {
    /// Create the handler.
    #[must_use]
    pub fn new(scheduler: Arc<dyn AgentScheduler>, engine: String) -> Self {
        Self { scheduler, engine }
    }
}

#[async_trait]
impl EventHandler for ReviewerHandler {
    fn name(&self) -> &'static str {
        "reviewer"
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::PrCreated]
    }

    async fn handle(&self, event: Arc<SchedulerEvent>) -> anyhow::Result<()> {
        let SchedulerEvent::PrCreated {
            metadata,
            issue_id,
            pr_url,
        } = event.as_ref()
        else {
            return Ok(());
        };

        let prompt = format!(
            "You are the Reviewer. Review the pull request at {pr_url}. Check \
             correctness, tests, and style; leave review comments and approve \
             or request changes."
        );
        let mut task = AgentTask::new(Role::Reviewer, prompt, &self.engine);
        if let Some(issue) = issue_id {
            task = task.with_issue(issue.clone());
        }
        task.metadata.extra.insert(
            "correlation_id".to_string(),
            metadata.correlation_id.to_string(),
        );

        let session_id = self.scheduler.schedule(task).await?;
        info!(%session_id, pr_url, "reviewer session scheduled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests_support::{RecordingScheduler, pr_created};

    #[tokio::test]
    async fn test_pr_created_schedules_reviewer() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let handler = ReviewerHandler::new(
            Arc::clone(&scheduler) as Arc<dyn AgentScheduler>,
            "gemini".to_string(),
        );

        handler
            .handle(Arc::new(pr_created(
                Some("FEAT-1"),
                "https://github.com/acme/repo/pull/7",
            )))
            .await
            .unwrap();

        let tasks = scheduler.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].role, Role::Reviewer);
        assert_eq!(tasks[0].engine, "gemini");
        assert!(tasks[0].prompt.contains("pull/7"));
        assert_eq!(tasks[0].issue_id.as_ref().unwrap().as_str(), "FEAT-1");
    }
}
