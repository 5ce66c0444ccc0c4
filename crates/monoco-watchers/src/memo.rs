//! Memo inbox watcher.
//!
//! `Memos/inbox.md` accumulates memo blocks separated by `## [hash]`
//! headings. The watcher counts unprocessed blocks and publishes
//! `MemoThreshold` with the parsed list once the count reaches the
//! threshold. It never edits the file — consumption (truncate + archive) is
//! the Architect handler's job, after which the count restarts from zero.

use crate::backend::WatchBackend;
use crate::error::WatchResult;
use monoco_events::{EventBus, EventMetadata, MemoEntry, SchedulerEvent};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Watches the memo inbox for accumulation.
pub struct MemoWatcher {
    inbox: PathBuf,
    threshold: usize,
    bus: EventBus,
    backend: WatchBackend,
    /// Hash of the last observed content, to skip unchanged scans.
    last_hash: Option<blake3::Hash>,
    /// Count at the previous scan, to detect new memos.
    last_count: usize,
}

impl MemoWatcher {
    /// Create a memo watcher.
    #[must_use]
    pub fn new(
        inbox: PathBuf,
        threshold: usize,
        bus: EventBus,
        force_polling: bool,
        poll_interval: Duration,
    ) -> Self {
        let roots = inbox
            .parent()
            .map(|dir| vec![dir.to_path_buf()])
            .unwrap_or_default();
        let backend = WatchBackend::new(&roots, force_polling, poll_interval);
        Self {
            inbox,
            threshold,
            bus,
            backend,
            last_hash: None,
            last_count: 0,
        }
    }

    /// Run until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; the supervisor restarts the
    /// watcher with backoff.
    pub async fn run(mut self, shutdown: CancellationToken) -> WatchResult<()> {
        info!(inbox = %self.inbox.display(), threshold = self.threshold, "memo watcher started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                result = self.backend.wait() => {
                    result?;
                    self.scan().await;
                },
            }
        }
    }

    /// One scan pass; IO failures are transient and only logged.
    async fn scan(&mut self) {
        let content = match std::fs::read_to_string(&self.inbox) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                debug!(error = %e, "memo inbox unreadable, skipping scan");
                return;
            },
        };

        let hash = blake3::hash(content.as_bytes());
        if self.last_hash == Some(hash) {
            return;
        }
        self.last_hash = Some(hash);

        let memos = parse_memos(&content);
        let count = memos.len();

        if count > self.last_count {
            self.bus
                .publish(SchedulerEvent::MemoCreated {
                    metadata: EventMetadata::fresh(),
                    count,
                })
                .await;
        }
        self.last_count = count;

        if count >= self.threshold {
            info!(count, threshold = self.threshold, "memo threshold reached");
            self.bus
                .publish(SchedulerEvent::MemoThreshold {
                    metadata: EventMetadata::fresh(),
                    memos,
                })
                .await;
        }
    }
}

/// Parse memo blocks out of the inbox content.
///
/// A block starts at a `## [hash]` heading and runs to the next heading or
/// end of file. Text before the first heading is preamble and not counted.
#[must_use]
pub fn parse_memos(content: &str) -> Vec<MemoEntry> {
    let mut memos: Vec<MemoEntry> = Vec::new();
    let mut current: Option<MemoEntry> = None;

    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("## [")
            && let Some(end) = rest.find(']')
        {
            if let Some(done) = current.take() {
                memos.push(done);
            }
            current = Some(MemoEntry {
                hash: rest[..end].to_string(),
                body: String::new(),
            });
            continue;
        }
        if let Some(entry) = current.as_mut() {
            entry.body.push_str(line);
            entry.body.push('\n');
        }
    }
    if let Some(done) = current.take() {
        memos.push(done);
    }

    for memo in &mut memos {
        memo.body = memo.body.trim().to_string();
    }
    memos
}
