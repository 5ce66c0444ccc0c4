//! Scan triggers: native filesystem events with a polling safety net, or
//! pure polling for network filesystems.
//!
//! Watchers are scan-based differs; the backend only decides when the next
//! scan runs. Native mode coalesces bursts of raw notify events for a short
//! window before waking the scanner, and still ticks at the polling interval
//! as a safety net, so both modes produce identical event streams.

use crate::error::WatchResult;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Burst-coalescing window for native events.
const NATIVE_COALESCE: Duration = Duration::from_millis(50);

/// Decides when a watcher scans.
pub enum WatchBackend {
    /// Scan on a fixed interval.
    Polling {
        /// Tick interval.
        interval: Duration,
    },
    /// Scan when the OS reports changes, with the interval as safety net.
    Native {
        /// Keeps filesystem monitoring alive; dropping it stops events.
        _watcher: RecommendedWatcher,
        /// Raw event stream from the notify callback thread.
        rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
        /// Safety-net tick interval.
        interval: Duration,
    },
}

impl WatchBackend {
    /// Build a backend over the given roots.
    ///
    /// Prefers native watching unless `force_polling` is set; falls back to
    /// polling if the native watcher cannot be initialized. Roots that do
    /// not exist yet are skipped (they are re-scanned by the polling safety
    /// net once created).
    #[must_use]
    pub fn new(roots: &[PathBuf], force_polling: bool, interval: Duration) -> Self {
        if force_polling {
            debug!("polling backend forced by configuration");
            return Self::Polling { interval };
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = RecommendedWatcher::new(
            move |event| {
                let _ = tx.send(event);
            },
            notify::Config::default(),
        );

        match watcher {
            Ok(mut watcher) => {
                for root in roots {
                    if !root.exists() {
                        debug!(path = %root.display(), "watch root absent, skipping");
                        continue;
                    }
                    if let Err(e) = watcher.watch(root, RecursiveMode::Recursive) {
                        warn!(path = %root.display(), error = %e, "failed to watch root");
                    }
                }
                Self::Native {
                    _watcher: watcher,
                    rx,
                    interval,
                }
            },
            Err(e) => {
                warn!(error = %e, "native watcher unavailable, falling back to polling");
                Self::Polling { interval }
            },
        }
    }

    /// Wait until the next scan should run.
    ///
    /// # Errors
    ///
    /// Returns an error if the native event stream reports a backend
    /// failure (the supervisor restarts the watcher).
    pub async fn wait(&mut self) -> WatchResult<()> {
        match self {
            Self::Polling { interval } => {
                tokio::time::sleep(*interval).await;
                Ok(())
            },
            Self::Native { rx, interval, .. } => {
                tokio::select! {
                    event = rx.recv() => {
                        if let Some(Err(e)) = event {
                            return Err(e.into());
                        }
                        // Coalesce the burst before waking the scanner.
                        let deadline = tokio::time::Instant::now()
                            .checked_add(NATIVE_COALESCE)
                            .unwrap_or_else(tokio::time::Instant::now);
                        while let Ok(Some(_)) =
                            tokio::time::timeout_at(deadline, rx.recv()).await
                        {}
                        Ok(())
                    },
                    () = tokio::time::sleep(*interval) => Ok(()),
                }
            },
        }
    }
}

impl std::fmt::Debug for WatchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Polling { interval } => f
                .debug_struct("WatchBackend::Polling")
                .field("interval", interval)
                .finish(),
            Self::Native { interval, .. } => f
                .debug_struct("WatchBackend::Native")
                .field("interval", interval)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_polling_backend_ticks() {
        let mut backend = WatchBackend::new(&[], true, Duration::from_millis(10));
        assert!(matches!(backend, WatchBackend::Polling { .. }));
        tokio::time::timeout(Duration::from_secs(1), backend.wait())
            .await
            .expect("tick")
            .unwrap();
    }

    #[tokio::test]
    async fn test_native_backend_safety_net_ticks_without_events() {
        let tmp = TempDir::new().unwrap();
        let mut backend = WatchBackend::new(
            &[tmp.path().to_path_buf()],
            false,
            Duration::from_millis(20),
        );
        // Whether native init succeeded or fell back, wait() must return.
        tokio::time::timeout(Duration::from_secs(2), backend.wait())
            .await
            .expect("tick")
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_root_does_not_fail() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("not-yet");
        let mut backend =
            WatchBackend::new(&[missing], false, Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(1), backend.wait())
            .await
            .expect("tick")
            .unwrap();
    }
}
