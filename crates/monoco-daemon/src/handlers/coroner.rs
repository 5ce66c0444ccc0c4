//! Coroner handler: failed sessions get an autopsy.

use super::EventHandler;
use async_trait::async_trait;
use monoco_core::{AgentTask, Role};
use monoco_events::{EventKind, SchedulerEvent};
use monoco_scheduler::{AgentScheduler, SchedulerError, SessionStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Schedules a Coroner autopsy on `SessionFailed`.
///
/// The autopsy task is a subagent of the failed session (depth + 1), so the
/// scheduler's depth limit bounds autopsy chains, and the cool-down guard
/// bounds autopsy frequency per issue. Failed coroner sessions never get
/// their own autopsy.
pub struct CoronerHandler {
    scheduler: Arc<dyn AgentScheduler>,
    store: Arc<SessionStore>,
    engine: String,
}

impl CoronerHandler {
    /// Create the handler.
    #[must_use]
    pub fn new(
        scheduler: Arc<dyn AgentScheduler>,
        store: Arc<SessionStore>,
        engine: String,
    ) -> Self {
        Self {
            scheduler,
            store,
            engine,
        }
    }
}

#[async_trait]
impl EventHandler for CoronerHandler {
    fn name(&self) -> &'static str {
        "coroner"
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::SessionFailed]
    }

    async fn handle(&self, event: Arc<SchedulerEvent>) -> anyhow::Result<()> {
        let SchedulerEvent::SessionFailed {
            metadata,
            session_id,
            role,
            issue_id,
            exit_code,
            reason,
            log_location,
        } = event.as_ref()
        else {
            return Ok(());
        };

        // No autopsies of autopsies.
        if *role == Role::Coroner {
            debug!(%session_id, "coroner session failed, not recursing");
            return Ok(());
        }

        let log_hint = log_location
            .as_ref()
            .map_or_else(|| "unavailable".to_string(), |p| p.display().to_string());
        let prompt = format!(
            "You are the Coroner. Session {session_id} ({role}) failed: {reason}, \
             exit code {exit_code:?}. Its stdout/stderr streams are under \
             {log_hint}. Read them, determine the root cause, and write an \
             autopsy memo to Memos/inbox.md."
        );

        let failed_depth = self
            .store
            .get(session_id)
            .await
            .map_or(0, |record| record.depth);
        let mut task = AgentTask::new(Role::Coroner, prompt, &self.engine)
            .with_parent(*session_id, failed_depth);
        if let Some(issue) = issue_id {
            task = task.with_issue(issue.clone());
        }
        task.metadata.extra.insert(
            "correlation_id".to_string(),
            metadata.correlation_id.to_string(),
        );

        match self.scheduler.schedule(task).await {
            Ok(autopsy_id) => {
                info!(%autopsy_id, failed = %session_id, "coroner autopsy scheduled");
                Ok(())
            },
            // Depth and cool-down limits are the designed bound on autopsy
            // cascades, not failures of this handler.
            Err(SchedulerError::SubagentDepthExceeded { depth, max }) => {
                debug!(failed = %session_id, depth, max, "autopsy refused by depth limit");
                Ok(())
            },
            Err(SchedulerError::CooldownActive { retry_after, .. }) => {
                debug!(failed = %session_id, ?retry_after, "autopsy refused by cool-down");
                Ok(())
            },
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests_support::{RecordingScheduler, session_failed};
    use tempfile::TempDir;

    fn handler(scheduler: &Arc<RecordingScheduler>) -> (CoronerHandler, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(SessionStore::open(tmp.path().join("sessions")).unwrap());
        (
            CoronerHandler::new(
                Arc::clone(scheduler) as Arc<dyn AgentScheduler>,
                store,
                "claude".to_string(),
            ),
            tmp,
        )
    }

    #[tokio::test]
    async fn test_failure_schedules_autopsy_with_context() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let (h, _tmp) = handler(&scheduler);

        h.handle(Arc::new(session_failed(Role::Engineer, Some("FEAT-1"))))
            .await
            .unwrap();

        let tasks = scheduler.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].role, Role::Coroner);
        assert!(tasks[0].prompt.contains("exit code Some(2)"));
        assert!(tasks[0].prompt.contains("/tmp/logs/session"));
        assert_eq!(tasks[0].issue_id.as_ref().unwrap().as_str(), "FEAT-1");
        assert_eq!(tasks[0].metadata.depth, 1);
        assert!(tasks[0].metadata.parent_session_id.is_some());
    }

    #[tokio::test]
    async fn test_coroner_failure_does_not_recurse() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let (h, _tmp) = handler(&scheduler);

        h.handle(Arc::new(session_failed(Role::Coroner, Some("FEAT-1"))))
            .await
            .unwrap();

        assert!(scheduler.tasks().is_empty());
    }
}
