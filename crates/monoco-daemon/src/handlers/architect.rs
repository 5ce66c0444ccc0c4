//! Architect handler: memo accumulation drives issue planning.

use super::EventHandler;
use async_trait::async_trait;
use monoco_core::{AgentTask, Role, WorkspaceLayout};
use monoco_events::{EventKind, MemoEntry, SchedulerEvent};
use monoco_scheduler::AgentScheduler;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Schedules an Architect run when the memo threshold is reached, then
/// archives the consumed memos so the next count starts from zero.
pub struct ArchitectHandler {
    scheduler: Arc<dyn AgentScheduler>,
    layout: WorkspaceLayout,
    engine: String,
    /// Minimum gap between successive Architect spawns.
    min_gap: Duration,
    last_spawn: std::sync::Mutex<Option<Instant>>,
}

impl ArchitectHandler {
    /// Create the handler.
    #[must_use]
    pub fn new(
        scheduler: Arc<dyn AgentScheduler>,
        layout: WorkspaceLayout,
        engine: String,
        min_gap: Duration,
    ) -> Self {
        Self {
            scheduler,
            layout,
            engine,
            min_gap,
            last_spawn: std::sync::Mutex::new(None),
        }
    }

    fn within_min_gap(&self) -> bool {
        let last = self
            .last_spawn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        last.is_some_and(|at| at.elapsed() < self.min_gap)
    }

    fn note_spawn(&self) {
        *self
            .last_spawn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Instant::now());
    }

    fn build_prompt(memos: &[MemoEntry]) -> String {
        let mut prompt = String::from(
            "You are the Architect. Turn the following memos into issue files \
             under Issues/, one per unit of work, with a YAML header carrying \
             `id` and `stage: todo`.\n",
        );
        for memo in memos {
            prompt.push_str("\n## [");
            prompt.push_str(&memo.hash);
            prompt.push_str("]\n\n");
            prompt.push_str(&memo.body);
            prompt.push('\n');
        }
        prompt
    }

    /// Move consumed memo blocks to `Memos/archive.md` and truncate the
    /// inbox, so the watcher's next threshold count starts from zero.
    fn consume_memos(&self, memos: &[MemoEntry]) -> std::io::Result<()> {
        let archive_path = self.layout.memo_archive();
        if let Some(dir) = archive_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let mut archived = std::fs::read_to_string(&archive_path).unwrap_or_default();
        for memo in memos {
            archived.push_str("## [");
            archived.push_str(&memo.hash);
            archived.push_str("]\n\n");
            archived.push_str(&memo.body);
            archived.push_str("\n\n");
        }
        monoco_core::write_atomic(&archive_path, archived.as_bytes())?;
        monoco_core::write_atomic(&self.layout.memo_inbox(), b"")?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for ArchitectHandler {
    fn name(&self) -> &'static str {
        "architect"
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::MemoThreshold]
    }

    async fn handle(&self, event: Arc<SchedulerEvent>) -> anyhow::Result<()> {
        let SchedulerEvent::MemoThreshold { metadata, memos } = event.as_ref() else {
            return Ok(());
        };

        if self.within_min_gap() {
            debug!("memo threshold within spawn gap, skipping");
            return Ok(());
        }

        let mut task = AgentTask::new(Role::Architect, Self::build_prompt(memos), &self.engine);
        task.metadata.extra.insert(
            "correlation_id".to_string(),
            metadata.correlation_id.to_string(),
        );

        let session_id = self.scheduler.schedule(task).await?;
        self.note_spawn();
        self.consume_memos(memos)?;
        info!(%session_id, memos = memos.len(), "architect session scheduled, memos archived");
        Ok(())
    }
}
