//! Mailbox inbound watcher with per-session debouncing.
//!
//! New files under `inbound/{provider}/` are parsed and coalesced per
//! external `session.id` over a quiescence window (per-provider, IM-style
//! providers default to 30 s, email to 0). The window resets on each new
//! message in the same session; it ends when no message arrives for the
//! window duration, at which point one `MailboxInboundReceived` batch is
//! published with the messages in arrival order. A zero window emits one
//! event per message.
//!
//! Malformed front matter quarantines the file to `_rejected/{provider}/`
//! and publishes `MailboxMalformed` instead of crashing the watcher.
//!
//! New files under `outbound/{provider}/` (queued by the CLI from agent
//! drafts) are announced as `MailboxOutboundRequested` for the courier.

use crate::backend::WatchBackend;
use crate::error::WatchResult;
use monoco_core::CorrelationId;
use monoco_events::{EventBus, EventMetadata, SchedulerEvent};
use monoco_mailbox::{MailboxStore, StoredMessage, parse_message};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type BatchKey = (String, String);

struct PendingBatch {
    messages: Vec<StoredMessage>,
    deadline: tokio::time::Instant,
}

/// Watches provider inbound directories and debounces per session.
pub struct MailboxWatcher {
    store: MailboxStore,
    bus: EventBus,
    debounce: monoco_config::MailboxSection,
    backend: WatchBackend,
    seen_inbound: HashSet<PathBuf>,
    seen_outbound: HashSet<PathBuf>,
}

impl MailboxWatcher {
    /// Create a mailbox watcher.
    #[must_use]
    pub fn new(
        store: MailboxStore,
        debounce: monoco_config::MailboxSection,
        bus: EventBus,
        force_polling: bool,
        poll_interval: Duration,
    ) -> Self {
        let roots = vec![store.root().to_path_buf()];
        let backend = WatchBackend::new(&roots, force_polling, poll_interval);
        Self {
            store,
            bus,
            debounce,
            backend,
            seen_inbound: HashSet::new(),
            seen_outbound: HashSet::new(),
        }
    }

    /// Run until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend or the store's directory listing
    /// fails; the supervisor restarts the watcher with backoff.
    pub async fn run(mut self, shutdown: CancellationToken) -> WatchResult<()> {
        info!(mailbox = %self.store.root().display(), "mailbox watcher started");
        let mut pending: HashMap<BatchKey, PendingBatch> = HashMap::new();

        loop {
            let next_deadline = pending.values().map(|batch| batch.deadline).min();

            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),

                // Quiescence windows that have elapsed flush first.
                () = async {
                    match next_deadline {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                } => {
                    self.flush_ready(&mut pending).await;
                },

                result = self.backend.wait() => {
                    result?;
                    self.scan(&mut pending).await?;
                },
            }
        }
    }

    async fn scan(&mut self, pending: &mut HashMap<BatchKey, PendingBatch>) -> WatchResult<()> {
        for provider in self.store.providers()? {
            let window = self.debounce.debounce_for(&provider);

            for path in self.store.list_inbound(&provider)? {
                if self.seen_inbound.contains(&path) {
                    continue;
                }
                let content = match std::fs::read_to_string(&path) {
                    Ok(content) => content,
                    // Raced with an archive move; the next scan settles it.
                    Err(_) => continue,
                };

                match parse_message(&content) {
                    Ok(message) => {
                        self.seen_inbound.insert(path.clone());
                        let stored = StoredMessage {
                            path,
                            envelope: message.envelope,
                            body: message.body,
                        };
                        self.ingest(provider.clone(), stored, window, pending).await;
                    },
                    Err(e) => {
                        let error = e.to_string();
                        match self.store.quarantine(&path) {
                            Ok(quarantined_path) => {
                                self.bus
                                    .publish(SchedulerEvent::MailboxMalformed {
                                        metadata: EventMetadata::fresh(),
                                        provider: provider.clone(),
                                        quarantined_path,
                                        error,
                                    })
                                    .await;
                            },
                            Err(move_err) => warn!(
                                path = %path.display(),
                                error = %move_err,
                                "failed to quarantine malformed message"
                            ),
                        }
                    },
                }
            }

            for path in self.store.list_outbound(&provider)? {
                if self.seen_outbound.insert(path.clone()) {
                    self.bus
                        .publish(SchedulerEvent::MailboxOutboundRequested {
                            metadata: EventMetadata::fresh(),
                            provider: provider.clone(),
                            path,
                        })
                        .await;
                }
            }
        }

        // Forget files that moved out of their queue so a same-named file
        // (e.g. a corrected reject) is processed again.
        self.seen_inbound.retain(|path| path.exists());
        self.seen_outbound.retain(|path| path.exists());
        Ok(())
    }

    async fn ingest(
        &self,
        provider: String,
        message: StoredMessage,
        window: Duration,
        pending: &mut HashMap<BatchKey, PendingBatch>,
    ) {
        let session_id = message.envelope.session.id.clone();
        debug!(provider = %provider, session_id = %session_id, id = %message.envelope.id, "inbound message");

        if window.is_zero() {
            // Zero window: every message is its own batch.
            self.publish_batch(&provider, &session_id, vec![message]).await;
            return;
        }

        let deadline = tokio::time::Instant::now()
            .checked_add(window)
            .unwrap_or_else(tokio::time::Instant::now);
        let batch = pending
            .entry((provider, session_id))
            .or_insert_with(|| PendingBatch {
                messages: Vec::new(),
                deadline,
            });
        batch.messages.push(message);
        // The window resets on each new message in the session.
        batch.deadline = deadline;
    }

    async fn flush_ready(&self, pending: &mut HashMap<BatchKey, PendingBatch>) {
        let now = tokio::time::Instant::now();
        let ready: Vec<BatchKey> = pending
            .iter()
            .filter(|(_, batch)| batch.deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in ready {
            if let Some(batch) = pending.remove(&key) {
                let (provider, session_id) = key;
                self.publish_batch(&provider, &session_id, batch.messages)
                    .await;
            }
        }
    }

    async fn publish_batch(
        &self,
        provider: &str,
        session_id: &str,
        messages: Vec<StoredMessage>,
    ) {
        // The batch inherits the first carried correlation id.
        let correlation = messages
            .iter()
            .find_map(|m| m.envelope.correlation_id())
            .map_or_else(CorrelationId::new, CorrelationId::from_string);

        info!(
            provider,
            session_id,
            count = messages.len(),
            "publishing inbound batch"
        );
        self.bus
            .publish(SchedulerEvent::MailboxInboundReceived {
                metadata: EventMetadata::new(correlation),
                provider: provider.to_string(),
                session_id: session_id.to_string(),
                messages,
            })
            .await;
    }
}
