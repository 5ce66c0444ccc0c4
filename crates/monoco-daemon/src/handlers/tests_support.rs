//! Shared fakes for handler tests.

use async_trait::async_trait;
use monoco_core::{AgentTask, Role, SessionId, SessionStatus};
use monoco_events::{EventMetadata, MemoEntry, SchedulerEvent};
use monoco_mailbox::{
    MediaKind, MessageEnvelope, Participant, Participants, SessionInfo, SessionKind,
    StoredMessage,
};
use monoco_scheduler::{AgentScheduler, SchedulerError, SchedulerResult, SchedulerStats};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Scheduler double that records scheduled tasks.
#[derive(Default)]
pub(crate) struct RecordingScheduler {
    tasks: std::sync::Mutex<Vec<AgentTask>>,
    /// When set, every schedule call is refused with `QuotaExhausted`.
    pub(crate) refuse: AtomicBool,
}

impl RecordingScheduler {
    pub(crate) fn tasks(&self) -> Vec<AgentTask> {
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AgentScheduler for RecordingScheduler {
    async fn schedule(&self, task: AgentTask) -> SchedulerResult<SessionId> {
        if self.refuse.load(Ordering::Relaxed) {
            return Err(SchedulerError::QuotaExhausted { role: task.role });
        }
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(task);
        Ok(SessionId::new())
    }

    async fn terminate(&self, _session_id: SessionId) -> SchedulerResult<bool> {
        Ok(false)
    }

    async fn get_status(&self, _session_id: SessionId) -> Option<SessionStatus> {
        None
    }

    async fn list_active(&self) -> HashMap<SessionId, SessionStatus> {
        HashMap::new()
    }

    async fn get_stats(&self) -> SchedulerStats {
        SchedulerStats::default()
    }
}

pub(crate) fn memo_threshold(memos: &[(&str, &str)]) -> SchedulerEvent {
    SchedulerEvent::MemoThreshold {
        metadata: EventMetadata::fresh(),
        memos: memos
            .iter()
            .map(|(hash, body)| MemoEntry {
                hash: (*hash).to_string(),
                body: (*body).to_string(),
            })
            .collect(),
    }
}

pub(crate) fn stage_changed(issue_id: &str, from: &str, to: &str) -> SchedulerEvent {
    SchedulerEvent::IssueStageChanged {
        metadata: EventMetadata::fresh(),
        issue_id: monoco_core::IssueId::from(issue_id),
        from_stage: from.to_string(),
        to_stage: to.to_string(),
    }
}

pub(crate) fn session_failed(role: Role, issue_id: Option<&str>) -> SchedulerEvent {
    SchedulerEvent::SessionFailed {
        metadata: EventMetadata::fresh(),
        session_id: SessionId::new(),
        role,
        issue_id: issue_id.map(monoco_core::IssueId::from),
        exit_code: Some(2),
        reason: "exit_code_2".to_string(),
        log_location: Some("/tmp/logs/session".into()),
    }
}

pub(crate) fn pr_created(issue_id: Option<&str>, url: &str) -> SchedulerEvent {
    SchedulerEvent::PrCreated {
        metadata: EventMetadata::fresh(),
        issue_id: issue_id.map(monoco_core::IssueId::from),
        pr_url: url.to_string(),
    }
}

pub(crate) fn stored_message(
    id: &str,
    provider: &str,
    session: &str,
    body: &str,
    mentions: &[&str],
) -> StoredMessage {
    StoredMessage {
        path: format!("/mailbox/inbound/{provider}/{id}.md").into(),
        envelope: MessageEnvelope {
            id: id.to_string(),
            provider: provider.to_string(),
            session: SessionInfo {
                id: session.to_string(),
                kind: SessionKind::Group,
            },
            participants: Participants {
                sender: Participant {
                    id: "u1".to_string(),
                    name: "Ada".to_string(),
                },
                recipients: Vec::new(),
                cc: Vec::new(),
                mentions: mentions.iter().map(ToString::to_string).collect(),
            },
            timestamp: "2026-02-10T10:00:00+00:00".parse().unwrap(),
            media: MediaKind::Text,
            thread_key: None,
            parent_id: None,
            root_id: None,
            artifacts: Vec::new(),
            correlation: None,
            reply_to: None,
            to: None,
            retry_count: None,
        },
        body: body.to_string(),
    }
}

pub(crate) fn inbound_batch(
    provider: &str,
    session: &str,
    messages: Vec<StoredMessage>,
) -> SchedulerEvent {
    SchedulerEvent::MailboxInboundReceived {
        metadata: EventMetadata::fresh(),
        provider: provider.to_string(),
        session_id: session.to_string(),
        messages,
    }
}
