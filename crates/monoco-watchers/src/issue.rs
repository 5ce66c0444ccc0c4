//! Issue tree watcher.
//!
//! Walks `Issues/**` tracking a content hash per file. Stage changes in the
//! YAML header emit `IssueStageChanged`; new files emit `IssueCreated`.
//! The first scan primes the cache silently so a daemon restart does not
//! replay creation events for the existing tree.

use crate::backend::WatchBackend;
use crate::error::WatchResult;
use monoco_core::IssueId;
use monoco_events::{EventBus, EventMetadata, SchedulerEvent};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stage name that closes an issue.
const CLOSED_STAGE: &str = "closed";

/// YAML header of an issue file.
#[derive(Debug, Deserialize)]
struct IssueHeader {
    id: String,
    stage: String,
}

#[derive(Debug, Clone)]
struct CachedIssue {
    issue_id: IssueId,
    stage: String,
    hash: blake3::Hash,
}

/// Watches the issue tree for creations and stage changes.
pub struct IssueWatcher {
    issues_dir: PathBuf,
    bus: EventBus,
    backend: WatchBackend,
    cache: HashMap<PathBuf, CachedIssue>,
    primed: bool,
}

impl IssueWatcher {
    /// Create an issue watcher.
    #[must_use]
    pub fn new(
        issues_dir: PathBuf,
        bus: EventBus,
        force_polling: bool,
        poll_interval: Duration,
    ) -> Self {
        let backend = WatchBackend::new(
            std::slice::from_ref(&issues_dir),
            force_polling,
            poll_interval,
        );
        Self {
            issues_dir,
            bus,
            backend,
            cache: HashMap::new(),
            primed: false,
        }
    }

    /// Run until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; the supervisor restarts the
    /// watcher with backoff.
    pub async fn run(mut self, shutdown: CancellationToken) -> WatchResult<()> {
        info!(issues = %self.issues_dir.display(), "issue watcher started");
        // Prime the cache before emitting anything.
        self.scan().await;
        self.primed = true;

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

    async fn scan(&mut self) {
        let mut seen: Vec<PathBuf> = Vec::new();

        for entry in walkdir::WalkDir::new(&self.issues_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path().to_path_buf();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            seen.push(path.clone());

            let Ok(content) = std::fs::read_to_string(&path) else {
                debug!(path = %path.display(), "issue file unreadable, skipping");
                continue;
            };
            let hash = blake3::hash(content.as_bytes());

            if let Some(cached) = self.cache.get(&path) {
                if cached.hash == hash {
                    continue;
                }
                let Some(header) = parse_issue_header(&content, &path) else {
                    continue;
                };
                let from_stage = cached.stage.clone();
                let issue_id = cached.issue_id.clone();
                self.cache.insert(
                    path,
                    CachedIssue {
                        issue_id: issue_id.clone(),
                        stage: header.stage.clone(),
                        hash,
                    },
                );
                if from_stage != header.stage {
                    info!(
                        issue_id = %issue_id,
                        from = %from_stage,
                        to = %header.stage,
                        "issue stage changed"
                    );
                    self.bus
                        .publish(SchedulerEvent::IssueStageChanged {
                            metadata: EventMetadata::fresh(),
                            issue_id: issue_id.clone(),
                            from_stage,
                            to_stage: header.stage.clone(),
                        })
                        .await;
                    if header.stage == CLOSED_STAGE {
                        self.bus
                            .publish(SchedulerEvent::IssueClosed {
                                metadata: EventMetadata::fresh(),
                                issue_id,
                            })
                            .await;
                    }
                }
            } else {
                let Some(header) = parse_issue_header(&content, &path) else {
                    continue;
                };
                let issue_id = IssueId::new(header.id);
                self.cache.insert(
                    path.clone(),
                    CachedIssue {
                        issue_id: issue_id.clone(),
                        stage: header.stage.clone(),
                        hash,
                    },
                );
                if self.primed {
                    info!(issue_id = %issue_id, stage = %header.stage, "issue created");
                    self.bus
                        .publish(SchedulerEvent::IssueCreated {
                            metadata: EventMetadata::fresh(),
                            issue_id,
                            stage: header.stage,
                            path,
                        })
                        .await;
                }
            }
        }

        // Deletions: closed issues leave silently, anything else is noted.
        let gone: Vec<PathBuf> = self
            .cache
            .keys()
            .filter(|path| !seen.contains(path))
            .cloned()
            .collect();
        for path in gone {
            if let Some(cached) = self.cache.remove(&path) {
                if cached.stage == CLOSED_STAGE {
                    debug!(issue_id = %cached.issue_id, "closed issue file removed");
                } else {
                    warn!(
                        issue_id = %cached.issue_id,
                        stage = %cached.stage,
                        "open issue file disappeared"
                    );
                }
            }
        }
    }
}

fn parse_issue_header(content: &str, path: &Path) -> Option<IssueHeader> {
    let rest = content.strip_prefix("---\n")?;
    let (header, _) = rest.split_once("\n---")?;
    match serde_yaml::from_str(header) {
        Ok(header) => Some(header),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed issue header");
            None
        },
    }
}
