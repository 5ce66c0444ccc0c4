//! Mailbox agent handler: inbound conversation batches get routed and
//! dispatched.

use super::EventHandler;
use async_trait::async_trait;
use monoco_core::AgentTask;
use monoco_events::{EventKind, SchedulerEvent};
use monoco_mailbox::{
    MailboxStore, MediaKind, MessageEnvelope, Participant, Participants, SessionInfo,
    StoredMessage,
};
use monoco_router::{ContextCache, MessageRouter};
use monoco_scheduler::{AgentScheduler, SchedulerError};
use std::sync::Arc;
use tracing::{info, warn};

/// Routes debounced inbound batches to a role and schedules it.
///
/// On a quota or cool-down refusal a synthetic outbound reply explaining
/// the refusal is queued (policy-controlled), so the user is not left
/// waiting on silence.
pub struct MailboxAgentHandler {
    scheduler: Arc<dyn AgentScheduler>,
    router: Arc<MessageRouter>,
    cache: Arc<ContextCache>,
    store: MailboxStore,
    engine: String,
    /// Queue a refusal reply when scheduling is refused.
    reply_on_refusal: bool,
}

impl MailboxAgentHandler {
    /// Create the handler.
    #[must_use]
    pub fn new(
        scheduler: Arc<dyn AgentScheduler>,
        router: Arc<MessageRouter>,
        cache: Arc<ContextCache>,
        store: MailboxStore,
        engine: String,
        reply_on_refusal: bool,
    ) -> Self {
        Self {
            scheduler,
            router,
            cache,
            store,
            engine,
            reply_on_refusal,
        }
    }

    fn build_prompt(role: monoco_core::Role, messages: &[StoredMessage]) -> String {
        let mut prompt = format!(
            "You are the {role}. Respond to this conversation; draft any reply \
             as an outbound message via the CLI.\n"
        );
        for message in messages {
            prompt.push('\n');
            prompt.push_str(&message.envelope.participants.sender.name);
            prompt.push_str(": ");
            prompt.push_str(&message.body);
            prompt.push('\n');
        }
        prompt
    }

    /// Queue a synthetic reply explaining a scheduling refusal.
    fn queue_refusal_reply(
        &self,
        provider: &str,
        last: &StoredMessage,
        reason: &str,
    ) -> Result<(), monoco_mailbox::MailboxError> {
        let envelope = MessageEnvelope {
            // One refusal per replied-to message id keeps this unique.
            id: format!("refusal-{}", last.envelope.id),
            provider: provider.to_string(),
            session: SessionInfo {
                id: last.envelope.session.id.clone(),
                kind: last.envelope.session.kind,
            },
            participants: Participants {
                sender: Participant {
                    id: "monoco".to_string(),
                    name: "Monoco".to_string(),
                },
                recipients: vec![last.envelope.participants.sender.clone()],
                cc: Vec::new(),
                mentions: Vec::new(),
            },
            timestamp: chrono::Utc::now().fixed_offset(),
            media: MediaKind::Text,
            thread_key: last.envelope.thread_key.clone(),
            parent_id: Some(last.envelope.id.clone()),
            root_id: last.envelope.root_id.clone(),
            artifacts: Vec::new(),
            correlation: last.envelope.correlation.clone(),
            reply_to: Some(last.envelope.id.clone()),
            to: None,
            retry_count: None,
        };
        let body = format!(
            "I can't take this on right now ({reason}). Your message is kept; \
             please try again shortly."
        );
        self.store.create_outbound(provider, &envelope, &body)?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for MailboxAgentHandler {
    fn name(&self) -> &'static str {
        "mailbox_agent"
    }

    fn interests(&self) -> &'static [EventKind] {
        &[EventKind::MailboxInboundReceived]
    }

    async fn handle(&self, event: Arc<SchedulerEvent>) -> anyhow::Result<()> {
        let SchedulerEvent::MailboxInboundReceived {
            metadata,
            provider,
            session_id,
            messages,
        } = event.as_ref()
        else {
            return Ok(());
        };
        let Some(last) = messages.last() else {
            return Ok(());
        };

        let context = self.cache.absorb_batch(provider, session_id, messages);
        let decision = self.router.route(&context)?;
        self.cache.note_route(session_id, decision.role.as_str());

        let mut task = AgentTask::new(
            decision.role,
            Self::build_prompt(decision.role, messages),
            &self.engine,
        );
        task.metadata.reject_if_full = true;
        task.metadata.extra.insert(
            "correlation_id".to_string(),
            metadata.correlation_id.to_string(),
        );
        task.metadata
            .extra
            .insert("external_session_id".to_string(), session_id.clone());
        let task_id = task.task_id;

        match self.scheduler.schedule(task).await {
            Ok(scheduled) => {
                self.cache.note_task(session_id, task_id);
                // Processing is complete for these files: archive them.
                for message in messages {
                    if let Err(e) = self.store.move_to_archive(&message.path) {
                        warn!(path = %message.path.display(), error = %e, "archive move failed");
                    }
                }
                info!(
                    session = %scheduled,
                    role = %decision.role,
                    rule = %decision.rule_name,
                    "inbound batch dispatched"
                );
                Ok(())
            },
            Err(
                refusal @ (SchedulerError::QuotaExhausted { .. }
                | SchedulerError::CooldownActive { .. }),
            ) => {
                warn!(%session_id, error = %refusal, "dispatch refused");
                if self.reply_on_refusal {
                    self.queue_refusal_reply(provider, last, &refusal.to_string())?;
                }
                Ok(())
            },
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests_support::{RecordingScheduler, inbound_batch, stored_message};
    use monoco_core::Role;
    use monoco_mailbox::parse_message;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        scheduler: Arc<RecordingScheduler>,
        handler: MailboxAgentHandler,
        store: MailboxStore,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = MailboxStore::new(tmp.path().join("mailbox"));
        let scheduler = Arc::new(RecordingScheduler::default());
        let router = Arc::new(
            MessageRouter::from_config(&[monoco_config::RuleSection {
                name: "mention-prime".to_string(),
                kind: "mention".to_string(),
                pattern: "@Prime".to_string(),
                target_role: "prime".to_string(),
                priority: 100,
                enabled: true,
            }])
            .unwrap(),
        );
        let handler = MailboxAgentHandler::new(
            Arc::clone(&scheduler) as Arc<dyn AgentScheduler>,
            router,
            Arc::new(ContextCache::new()),
            store.clone(),
            "claude".to_string(),
            true,
        );
        Fixture {
            _tmp: tmp,
            scheduler,
            handler,
            store,
        }
    }

    #[tokio::test]
    async fn test_mention_routes_to_mailbox_role_and_archives() {
        let f = fixture();

        // A real inbound file, so the archive move has something to move.
        let message = stored_message("m1", "dingtalk", "chat_1", "@Prime help", &["@Prime"]);
        let path = f
            .store
            .create_inbound("dingtalk", &message.envelope, &message.body)
            .unwrap();
        let mut on_disk = message.clone();
        on_disk.path = path.clone();

        f.handler
            .handle(Arc::new(inbound_batch("dingtalk", "chat_1", vec![on_disk])))
            .await
            .unwrap();

        let tasks = f.scheduler.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].role, Role::Mailbox);
        assert!(tasks[0].prompt.contains("@Prime help"));
        assert!(tasks[0].metadata.reject_if_full);

        // Inbound file moved to the archive.
        assert!(!path.exists());
        assert_eq!(f.store.list_inbound("dingtalk").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_fallback_routes_to_architect() {
        let f = fixture();
        let message = stored_message("m2", "email", "thread_9", "please add dark mode", &[]);

        f.handler
            .handle(Arc::new(inbound_batch("email", "thread_9", vec![message])))
            .await
            .unwrap();

        let tasks = f.scheduler.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].role, Role::Architect);
    }

    #[tokio::test]
    async fn test_refusal_queues_synthetic_reply() {
        let f = fixture();
        f.scheduler.refuse.store(true, Ordering::Relaxed);

        let message = stored_message("m3", "dingtalk", "chat_2", "@Prime do it", &["@Prime"]);
        f.handler
            .handle(Arc::new(inbound_batch("dingtalk", "chat_2", vec![message])))
            .await
            .unwrap();

        let outbound = f.store.list_outbound("dingtalk").unwrap();
        assert_eq!(outbound.len(), 1);
        let reply = parse_message(&std::fs::read_to_string(&outbound[0]).unwrap()).unwrap();
        assert_eq!(reply.envelope.reply_to.as_deref(), Some("m3"));
        assert_eq!(reply.envelope.session.id, "chat_2");
        assert!(reply.body.contains("quota exhausted"));
    }

    #[tokio::test]
    async fn test_empty_batch_is_ignored() {
        let f = fixture();
        f.handler
            .handle(Arc::new(inbound_batch("email", "chat_3", Vec::new())))
            .await
            .unwrap();
        assert!(f.scheduler.tasks().is_empty());
    }
}
