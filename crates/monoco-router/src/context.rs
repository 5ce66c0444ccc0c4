//! Conversation context: the router's input and its in-memory cache.

use monoco_core::TaskId;
use monoco_mailbox::{MailboxStore, StoredMessage, parse_message};
use std::collections::VecDeque;
use tracing::debug;

/// How many messages a conversation keeps in memory.
pub const DEFAULT_HISTORY_CAP: usize = 20;

/// Per-external-session routing context.
///
/// Authoritative in memory only; rebuildable from the mailbox store.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    /// External conversation id.
    pub session_id: String,
    /// Provider the conversation lives on.
    pub provider: String,
    /// Recent messages, oldest first, capped at the history limit.
    pub recent: VecDeque<StoredMessage>,
    /// Role name of the last routing decision.
    pub last_route: Option<String>,
    /// Task currently working this conversation, if any.
    pub active_task: Option<TaskId>,
}

impl ConversationContext {
    /// Empty context for a conversation.
    #[must_use]
    pub fn new(session_id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            provider: provider.into(),
            recent: VecDeque::new(),
            last_route: None,
            active_task: None,
        }
    }

    /// Append a message, evicting the oldest beyond the cap.
    pub fn push(&mut self, message: StoredMessage) {
        if self.recent.len() >= DEFAULT_HISTORY_CAP {
            self.recent.pop_front();
        }
        self.recent.push_back(message);
    }

    /// Body of the newest message, or empty.
    #[must_use]
    pub fn latest_body(&self) -> &str {
        self.recent.back().map_or("", |m| m.body.as_str())
    }

    /// All bodies joined by newlines, oldest first.
    #[must_use]
    pub fn concatenated_body(&self) -> String {
        let bodies: Vec<&str> = self.recent.iter().map(|m| m.body.as_str()).collect();
        bodies.join("\n")
    }

    /// Mentions across all recent messages.
    pub fn mentions(&self) -> impl Iterator<Item = &str> {
        self.recent
            .iter()
            .flat_map(|m| m.envelope.participants.mentions.iter())
            .map(String::as_str)
    }

    /// Correlation id of the newest message that carries one.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.recent
            .iter()
            .rev()
            .find_map(|m| m.envelope.correlation_id())
    }
}

/// Cache of conversation contexts, keyed by external session id.
#[derive(Debug, Default)]
pub struct ContextCache {
    map: dashmap::DashMap<String, ConversationContext>,
}

impl ContextCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an inbound batch into the conversation and return a snapshot.
    pub fn absorb_batch(
        &self,
        provider: &str,
        session_id: &str,
        messages: &[StoredMessage],
    ) -> ConversationContext {
        let mut entry = self
            .map
            .entry(session_id.to_string())
            .or_insert_with(|| ConversationContext::new(session_id, provider));
        for message in messages {
            entry.push(message.clone());
        }
        entry.clone()
    }

    /// Record the routing decision made for a conversation.
    pub fn note_route(&self, session_id: &str, role: &str) {
        if let Some(mut entry) = self.map.get_mut(session_id) {
            entry.last_route = Some(role.to_string());
        }
    }

    /// Record the task now working a conversation.
    pub fn note_task(&self, session_id: &str, task_id: TaskId) {
        if let Some(mut entry) = self.map.get_mut(session_id) {
            entry.active_task = Some(task_id);
        }
    }

    /// Snapshot of one conversation, if cached.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<ConversationContext> {
        self.map.get(session_id).map(|entry| entry.clone())
    }

    /// Rebuild a conversation from the mailbox after a cache miss.
    ///
    /// Scans the provider's inbound and archive directories for messages of
    /// the session, oldest first. Malformed files are skipped; the inbound
    /// watcher owns quarantining them.
    pub fn rebuild(
        &self,
        store: &MailboxStore,
        provider: &str,
        session_id: &str,
    ) -> ConversationContext {
        let mut context = ConversationContext::new(session_id, provider);

        let mut paths = store.list_inbound(provider).unwrap_or_default();
        let archive = store.archive_dir(provider);
        if archive.is_dir()
            && let Ok(entries) = std::fs::read_dir(&archive)
        {
            paths.extend(entries.flatten().map(|e| e.path()).filter(|p| {
                p.extension().and_then(|e| e.to_str()) == Some("md")
            }));
        }
        paths.sort_by_key(|p| p.file_name().map(std::ffi::OsStr::to_os_string));

        for path in paths {
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let Ok(message) = parse_message(&content) else {
                continue;
            };
            if message.envelope.session.id == session_id {
                context.push(StoredMessage {
                    path,
                    envelope: message.envelope,
                    body: message.body,
                });
            }
        }

        debug!(
            session_id,
            provider,
            messages = context.recent.len(),
            "rebuilt conversation context from mailbox"
        );
        self.map.insert(session_id.to_string(), context.clone());
        context
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use monoco_mailbox::{
        MediaKind, MessageEnvelope, Participant, Participants, SessionInfo, SessionKind,
    };

    pub(crate) fn stored(body: &str, mentions: &[&str]) -> StoredMessage {
        StoredMessage {
            path: "inbound/test/msg.md".into(),
            envelope: MessageEnvelope {
                id: "m1".to_string(),
                provider: "test".to_string(),
                session: SessionInfo {
                    id: "chat_1".to_string(),
                    kind: SessionKind::Direct,
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

    pub(crate) fn context_with_bodies(bodies: &[&str]) -> ConversationContext {
        let mut context = ConversationContext::new("chat_1", "test");
        for body in bodies {
            context.push(stored(body, &[]));
        }
        context
    }

    pub(crate) fn context_with_mentions(bodies: &[&str], mentions: &[&str]) -> ConversationContext {
        let mut context = ConversationContext::new("chat_1", "test");
        for body in bodies {
            context.push(stored(body, mentions));
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::stored;
    use super::*;

    #[test]
    fn test_history_cap_evicts_oldest() {
        let mut context = ConversationContext::new("chat_1", "test");
        for i in 0..(DEFAULT_HISTORY_CAP + 5) {
            context.push(stored(&format!("msg {i}"), &[]));
        }
        assert_eq!(context.recent.len(), DEFAULT_HISTORY_CAP);
        assert_eq!(context.recent.front().unwrap().body, "msg 5");
        assert_eq!(context.latest_body(), format!("msg {}", DEFAULT_HISTORY_CAP + 4));
    }

    #[test]
    fn test_absorb_batch_accumulates() {
        let cache = ContextCache::new();
        let first = cache.absorb_batch("test", "chat_1", &[stored("one", &[])]);
        assert_eq!(first.recent.len(), 1);

        let second = cache.absorb_batch("test", "chat_1", &[stored("two", &[])]);
        assert_eq!(second.recent.len(), 2);
        assert_eq!(second.latest_body(), "two");
    }

    #[test]
    fn test_note_route_and_task() {
        let cache = ContextCache::new();
        cache.absorb_batch("test", "chat_1", &[stored("hi", &[])]);

        cache.note_route("chat_1", "mailbox");
        let task_id = TaskId::new();
        cache.note_task("chat_1", task_id);

        let context = cache.get("chat_1").unwrap();
        assert_eq!(context.last_route.as_deref(), Some("mailbox"));
        assert_eq!(context.active_task, Some(task_id));
    }

    #[test]
    fn test_rebuild_from_store() {
        use monoco_mailbox::MailboxStore;
        let tmp = tempfile::TempDir::new().unwrap();
        let store = MailboxStore::new(tmp.path());

        let message = stored("hello from disk", &[]);
        store
            .create_inbound("test", &message.envelope, &message.body)
            .unwrap();

        // A message of another session must not leak in.
        let mut other = stored("other chat", &[]);
        other.envelope.session.id = "chat_2".to_string();
        other.envelope.id = "m2".to_string();
        store
            .create_inbound("test", &other.envelope, &other.body)
            .unwrap();

        let cache = ContextCache::new();
        let context = cache.rebuild(&store, "test", "chat_1");
        assert_eq!(context.recent.len(), 1);
        assert_eq!(context.latest_body(), "hello from disk");
        assert!(cache.get("chat_1").is_some());
    }
}
