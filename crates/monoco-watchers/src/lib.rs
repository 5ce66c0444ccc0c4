//! Monoco Watchers - filesystem signals to typed events.
//!
//! Three watchers run as independent cooperative tasks:
//!
//! - [`MemoWatcher`] counts unprocessed memo blocks in `Memos/inbox.md` and
//!   publishes `MemoThreshold` when the count reaches the threshold.
//! - [`IssueWatcher`] tracks a content hash per issue file under `Issues/`
//!   and publishes `IssueCreated` / `IssueStageChanged` / `IssueClosed`.
//! - [`MailboxWatcher`] ingests `.monoco/mailbox/inbound/{provider}/`,
//!   quarantines malformed files, and publishes per-session debounced
//!   `MailboxInboundReceived` batches.
//!
//! All watchers are scan-based: the backend only decides *when* to scan
//! (native notify events or a polling tick), so both backends produce
//! identical events. A failed watcher is restarted by [`run_supervised`]
//! with exponential backoff (1, 2, 4, 8 ... 30 s).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod backend;
mod error;
mod issue;
mod mailbox;
mod memo;

pub use backend::WatchBackend;
pub use error::{WatchError, WatchResult};
pub use issue::IssueWatcher;
pub use mailbox::MailboxWatcher;
pub use memo::{MemoWatcher, parse_memos};

use monoco_core::BackoffConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Consecutive failures after which the daemon is marked unhealthy.
const UNHEALTHY_AFTER: u32 = 5;

/// Run a watcher until shutdown, restarting it on failure.
///
/// The factory builds a fresh watcher future per attempt (state is
/// re-primed after a restart). Repeated failures flip `healthy` to `false`;
/// one clean scan cycle flips it back.
pub async fn run_supervised<F, Fut>(
    name: &'static str,
    shutdown: CancellationToken,
    healthy: Arc<AtomicBool>,
    mut factory: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = WatchResult<()>>,
{
    let backoff = BackoffConfig::watcher_restart();
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!(watcher = name, "watcher stopped by shutdown");
                return;
            },
            result = factory() => match result {
                Ok(()) => {
                    info!(watcher = name, "watcher finished cleanly");
                    return;
                },
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    if attempt >= UNHEALTHY_AFTER {
                        healthy.store(false, Ordering::Relaxed);
                    }
                    let delay = backoff.delay_for_attempt(attempt);
                    warn!(
                        watcher = name,
                        error = %e,
                        attempt,
                        delay_secs = delay.as_secs(),
                        "watcher failed, restarting after backoff"
                    );
                    tokio::select! {
                        () = shutdown.cancelled() => return,
                        () = tokio::time::sleep(delay) => {},
                    }
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_supervisor_restarts_until_success() {
        let shutdown = CancellationToken::new();
        let healthy = Arc::new(AtomicBool::new(true));
        let runs = Arc::new(AtomicU32::new(0));

        let runs_clone = Arc::clone(&runs);
        run_supervised("test", shutdown, Arc::clone(&healthy), move || {
            let runs = Arc::clone(&runs_clone);
            async move {
                let n = runs.fetch_add(1, Ordering::Relaxed);
                if n < 2 {
                    Err(WatchError::Io(std::io::Error::other("boom")))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(runs.load(Ordering::Relaxed), 3);
        assert!(healthy.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_supervisor_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let healthy = Arc::new(AtomicBool::new(true));
        shutdown.cancel();

        run_supervised("test", shutdown, healthy, || async {
            Err(WatchError::Io(std::io::Error::other("never runs again")))
        })
        .await;
    }

    #[tokio::test]
    async fn test_supervisor_marks_unhealthy_after_repeated_failures() {
        // Paused time auto-advances through the backoff sleeps.
        tokio::time::pause();
        let shutdown = CancellationToken::new();
        let healthy = Arc::new(AtomicBool::new(true));
        let runs = Arc::new(AtomicU32::new(0));

        let shutdown_clone = shutdown.clone();
        let runs_clone = Arc::clone(&runs);
        // Cancel once enough failures have accumulated, so the test ends.
        let supervisor = run_supervised(
            "test",
            shutdown.clone(),
            Arc::clone(&healthy),
            move || {
                let runs = Arc::clone(&runs_clone);
                let shutdown = shutdown_clone.clone();
                async move {
                    if runs.fetch_add(1, Ordering::Relaxed) >= UNHEALTHY_AFTER {
                        shutdown.cancel();
                    }
                    Err(WatchError::Io(std::io::Error::other("boom")))
                }
            },
        );
        tokio::time::timeout(std::time::Duration::from_secs(60), supervisor)
            .await
            .expect("supervisor should stop after cancellation");

        assert!(!healthy.load(Ordering::Relaxed));
    }
}
