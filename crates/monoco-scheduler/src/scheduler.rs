//! The local-process agent scheduler.

use crate::cooldown::CooldownGuard;
use crate::error::{SchedulerError, SchedulerResult};
use crate::isolation;
use crate::quota::{QuotaPermit, RoleQuotas};
use crate::store::SessionStore;
use async_trait::async_trait;
use monoco_core::session::TerminationKind;
use monoco_core::{
    AgentTask, CorrelationId, IssueId, Role, SessionId, SessionRecord, SessionStatus,
};
use monoco_engine::{EngineAdapter, EngineRegistry};
use monoco_events::{EventBus, EventMetadata, SchedulerEvent};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Scheduler counters for introspection.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Sessions accepted but not yet running.
    pub pending: usize,
    /// Sessions with a live child process.
    pub running: usize,
    /// Sessions that exited successfully.
    pub completed: usize,
    /// Sessions that failed.
    pub failed: usize,
    /// Sessions that were terminated.
    pub terminated: usize,
    /// Running sessions per role.
    pub per_role_running: HashMap<Role, usize>,
    /// Age of the longest-running session.
    pub oldest_running_age: Option<chrono::Duration>,
}

/// The scheduling interface handlers program against.
#[async_trait]
pub trait AgentScheduler: Send + Sync {
    /// Turn a task into a supervised session; returns the session id.
    ///
    /// Re-entry for a `(role, issue)` pair with a live session returns the
    /// existing session id instead of spawning a second agent.
    async fn schedule(&self, task: AgentTask) -> SchedulerResult<SessionId>;

    /// Cooperatively terminate a session, force-killing after the grace
    /// window. Returns `false` (and publishes nothing) for sessions already
    /// in a terminal state.
    async fn terminate(&self, session_id: SessionId) -> SchedulerResult<bool>;

    /// Current status of a session.
    async fn get_status(&self, session_id: SessionId) -> Option<SessionStatus>;

    /// All non-terminal sessions.
    async fn list_active(&self) -> HashMap<SessionId, SessionStatus>;

    /// Counters for introspection.
    async fn get_stats(&self) -> SchedulerStats;
}

struct ActiveHandle {
    cancel: CancellationToken,
    term_reason: Arc<std::sync::Mutex<Option<TerminationKind>>>,
    role: Role,
}

struct Inner {
    config: monoco_config::SchedulerSection,
    project_root: PathBuf,
    logs_dir: PathBuf,
    engines: Arc<EngineRegistry>,
    store: Arc<SessionStore>,
    bus: EventBus,
    quotas: RoleQuotas,
    cooldown: CooldownGuard,
    active: std::sync::Mutex<HashMap<SessionId, ActiveHandle>>,
    /// Live `(role, issue)` pairs, enforcing single-session re-entry.
    pairs: std::sync::Mutex<HashMap<(Role, IssueId), SessionId>>,
    idle_notify: Notify,
    shutdown: CancellationToken,
}

impl Inner {
    fn remove_pair(&self, role: Role, issue_id: Option<&IssueId>) {
        if let Some(issue) = issue_id {
            self.pairs
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .remove(&(role, issue.clone()));
        }
    }

    fn release_active(&self, session_id: &SessionId) {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        active.remove(session_id);
        if active.is_empty() {
            self.idle_notify.notify_waiters();
        }
    }
}

/// Spawns, supervises, and terminates agent child processes on this host.
#[derive(Clone)]
pub struct LocalScheduler {
    inner: Arc<Inner>,
}

impl LocalScheduler {
    /// Create a scheduler.
    ///
    /// `project_root` is the agents' default working directory; `logs_dir`
    /// receives one subdirectory of stdout/stderr streams per session.
    #[must_use]
    pub fn new(
        project_root: impl Into<PathBuf>,
        logs_dir: impl Into<PathBuf>,
        config: monoco_config::SchedulerSection,
        engines: Arc<EngineRegistry>,
        store: Arc<SessionStore>,
        bus: EventBus,
    ) -> Self {
        let role_caps: HashMap<Role, usize> = config
            .concurrency
            .per_role
            .iter()
            .filter_map(|(name, cap)| name.parse::<Role>().ok().map(|role| (role, *cap)))
            .collect();
        let quotas = RoleQuotas::new(config.concurrency.global, &role_caps);
        let cooldown = CooldownGuard::from_config(&config.failure_cooldown);

        Self {
            inner: Arc::new(Inner {
                config,
                project_root: project_root.into(),
                logs_dir: logs_dir.into(),
                engines,
                store,
                bus,
                quotas,
                cooldown,
                active: std::sync::Mutex::new(HashMap::new()),
                pairs: std::sync::Mutex::new(HashMap::new()),
                idle_notify: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// The session store backing this scheduler.
    #[must_use]
    pub fn store(&self) -> Arc<SessionStore> {
        Arc::clone(&self.inner.store)
    }

    /// Recover persisted state after a daemon restart.
    ///
    /// Running sessions whose pid is gone are marked failed with reason
    /// `daemon_restart` and a `SessionFailed` event; live detached children
    /// are left alone (no re-attach). Pending sessions are left pending with
    /// a diagnostic.
    ///
    /// # Errors
    ///
    /// Returns an error if the session directory cannot be read or a
    /// recovered transition cannot be persisted.
    pub async fn recover(&self) -> SchedulerResult<usize> {
        let records = self.inner.store.load_all().await?;
        let mut recovered: usize = 0;

        for mut record in records {
            match record.status {
                SessionStatus::Running => {
                    if record.pid.is_some_and(pid_alive) {
                        warn!(
                            session_id = %record.session_id,
                            pid = record.pid,
                            "detached child still running; not re-attaching"
                        );
                        continue;
                    }
                    record.transition(SessionStatus::Failed)?;
                    record.failure_reason = Some("daemon_restart".to_string());
                    self.inner.store.put(&record).await?;
                    self.inner
                        .bus
                        .publish(SchedulerEvent::SessionFailed {
                            metadata: EventMetadata::new(task_correlation(&record.task)),
                            session_id: record.session_id,
                            role: record.task.role,
                            issue_id: record.task.issue_id.clone(),
                            exit_code: None,
                            reason: "daemon_restart".to_string(),
                            log_location: record.log_location.clone(),
                        })
                        .await;
                    recovered = recovered.saturating_add(1);
                },
                SessionStatus::Pending => {
                    warn!(
                        session_id = %record.session_id,
                        "pending session survived a restart; left pending"
                    );
                },
                _ => {},
            }
        }

        if recovered > 0 {
            info!(recovered, "marked orphaned running sessions as failed");
        }
        Ok(recovered)
    }

    /// Terminate every active session (used by daemon shutdown).
    pub fn terminate_all(&self, kind: TerminationKind) {
        let handles: Vec<(CancellationToken, Arc<std::sync::Mutex<Option<TerminationKind>>>)> = {
            let active = self
                .inner
                .active
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            active
                .values()
                .map(|h| (h.cancel.clone(), Arc::clone(&h.term_reason)))
                .collect()
        };
        for (cancel, reason) in handles {
            *reason
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(kind);
            cancel.cancel();
        }
    }

    /// Wait until no session is active, or the timeout expires.
    ///
    /// Returns `true` if the scheduler drained in time.
    pub async fn wait_idle(&self, timeout: std::time::Duration) -> bool {
        let drained = async {
            loop {
                let empty = self
                    .inner
                    .active
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .is_empty();
                if empty {
                    return;
                }
                self.inner.idle_notify.notified().await;
            }
        };
        tokio::select! {
            () = drained => true,
            () = tokio::time::sleep(timeout) => self
                .inner
                .active
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .is_empty(),
        }
    }

    /// Stop accepting new schedule requests.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
    }

    async fn spawn_session(
        &self,
        mut record: SessionRecord,
        adapter: Arc<dyn EngineAdapter>,
        permit: QuotaPermit,
    ) -> SchedulerResult<SessionId> {
        let session_id = record.session_id;
        let role = record.task.role;
        let issue_id = record.task.issue_id.clone();
        let correlation = task_correlation(&record.task);

        let log_dir = self.inner.logs_dir.join(session_id.to_string());
        std::fs::create_dir_all(&log_dir)?;
        let stdout = std::fs::File::create(log_dir.join("stdout.log"))?;
        let stderr = std::fs::File::create(log_dir.join("stderr.log"))?;
        record.log_location = Some(log_dir);

        let workdir = isolation::prepare_workdir(
            &self.inner.project_root,
            &session_id,
            record.task.metadata.isolation,
        )
        .await;

        let mut env = HashMap::new();
        env.insert("MONOCO_SESSION_ID".to_string(), session_id.to_string());
        env.insert("MONOCO_ROLE".to_string(), role.as_str().to_string());
        env.insert(
            "MONOCO_CORRELATION_ID".to_string(),
            correlation.to_string(),
        );
        env.insert(
            "MONOCO_DEPTH".to_string(),
            record.task.metadata.depth.to_string(),
        );
        if let Some(issue) = &issue_id {
            env.insert("MONOCO_ISSUE_ID".to_string(), issue.to_string());
        }
        let command = adapter.build_command(&record.task.prompt, &env);

        let spawned_at = Instant::now();
        let spawn_result = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .envs(&command.env)
            .current_dir(&workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawn_result {
            Ok(child) => child,
            Err(e) => {
                record.transition(SessionStatus::Failed)?;
                record.failure_reason = Some("spawn_failure".to_string());
                self.finalize(&record, &correlation, None).await;
                return Err(SchedulerError::SpawnFailed(e));
            },
        };

        let pid = child.id().unwrap_or_default();
        record.pid = Some(pid);
        record.transition(SessionStatus::Running)?;
        if let Err(e) = self.inner.store.put(&record).await {
            // The transition is aborted: kill the child and report.
            let _ = child.start_kill();
            self.inner
                .bus
                .publish(SchedulerEvent::SchedulerPersistFailure {
                    metadata: EventMetadata::new(correlation.clone()),
                    session_id,
                    error: e.to_string(),
                })
                .await;
            self.inner.remove_pair(role, issue_id.as_ref());
            return Err(e);
        }

        self.inner
            .bus
            .publish(SchedulerEvent::SessionStarted {
                metadata: EventMetadata::new(correlation.clone()),
                session_id,
                role,
                issue_id: issue_id.clone(),
                pid,
            })
            .await;
        info!(%session_id, %role, pid, "session started");

        // Sessions get their own token: closing the scheduler stops intake
        // without killing running agents (termination is a separate step).
        let cancel = CancellationToken::new();
        let term_reason = Arc::new(std::sync::Mutex::new(None));
        self.inner
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                session_id,
                ActiveHandle {
                    cancel: cancel.clone(),
                    term_reason: Arc::clone(&term_reason),
                    role,
                },
            );

        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler
                .supervise(record, child, cancel, term_reason, permit, spawned_at)
                .await;
        });

        Ok(session_id)
    }

    /// Awaiter task for one running session.
    async fn supervise(
        self,
        mut record: SessionRecord,
        mut child: tokio::process::Child,
        cancel: CancellationToken,
        term_reason: Arc<std::sync::Mutex<Option<TerminationKind>>>,
        permit: QuotaPermit,
        spawned_at: Instant,
    ) {
        enum Outcome {
            Exited(std::process::ExitStatus),
            WaitFailed(std::io::Error),
            Terminate(TerminationKind),
        }

        let timeout = record.task.timeout;
        let outcome = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => Outcome::Exited(status),
                Err(e) => Outcome::WaitFailed(e),
            },
            () = cancel.cancelled() => Outcome::Terminate(
                term_reason
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .take()
                    .unwrap_or(TerminationKind::Requested),
            ),
            () = async {
                match timeout {
                    Some(t) => tokio::time::sleep(t).await,
                    None => std::future::pending().await,
                }
            } => Outcome::Terminate(TerminationKind::Timeout),
        };

        let correlation = task_correlation(&record.task);
        match outcome {
            Outcome::Exited(status) => {
                record.exit_code = status.code();
                if spawned_at.elapsed() < self.inner.config.spawn_window() {
                    // Died right after spawn: spawn failure, even on exit 0.
                    let _ = record.transition(SessionStatus::Failed);
                    record.failure_reason = Some("spawn_failure".to_string());
                } else if status.success() {
                    let _ = record.transition(SessionStatus::Completed);
                } else {
                    let _ = record.transition(SessionStatus::Failed);
                    record.failure_reason =
                        Some(format!("exit_code_{}", status.code().unwrap_or(-1)));
                }
            },
            Outcome::WaitFailed(e) => {
                let _ = record.transition(SessionStatus::Failed);
                record.failure_reason = Some(format!("wait_failed: {e}"));
            },
            Outcome::Terminate(kind) => {
                self.shutdown_child(&mut child, record.pid).await;
                record.termination = Some(kind);
                let _ = record.transition(SessionStatus::Terminated);
            },
        }

        self.finalize(&record, &correlation, Some(permit)).await;
    }

    /// Cooperative SIGTERM, then SIGKILL after the grace window.
    async fn shutdown_child(&self, child: &mut tokio::process::Child, pid: Option<u32>) {
        if let Some(pid) = pid {
            send_sigterm(pid);
        }
        let grace = self.inner.config.terminate_grace();
        if tokio::time::timeout(grace, child.wait()).await.is_err() {
            warn!(pid, "grace window expired, force-killing child");
            let _ = child.kill().await;
        }
    }

    /// Persist the terminal record, release bookkeeping, publish the
    /// terminal event. Persist failure aborts the transition: the prior
    /// state stays on disk and only a persist-failure event is published.
    async fn finalize(
        &self,
        record: &SessionRecord,
        correlation: &CorrelationId,
        permit: Option<QuotaPermit>,
    ) {
        let session_id = record.session_id;
        let role = record.task.role;
        let issue_id = record.task.issue_id.clone();

        let persisted = self.inner.store.put(record).await;

        // Bookkeeping is released before the terminal event publishes, so a
        // handler reacting to the event observes the freed pair, the armed
        // cool-down, and the freed quota slot.
        self.inner.remove_pair(role, issue_id.as_ref());
        if persisted.is_ok()
            && let Some(issue) = &issue_id
        {
            match record.status {
                SessionStatus::Failed => {
                    self.inner.cooldown.record_failure(role, issue);
                },
                SessionStatus::Completed => {
                    self.inner.cooldown.record_success(role, issue);
                },
                _ => {},
            }
        }
        self.inner.release_active(&session_id);
        drop(permit);

        match persisted {
            Ok(()) => {
                let metadata = EventMetadata::new(correlation.clone());
                let event = match record.status {
                    SessionStatus::Completed => Some(SchedulerEvent::SessionCompleted {
                        metadata,
                        session_id,
                        role,
                        issue_id: issue_id.clone(),
                    }),
                    SessionStatus::Failed => Some(SchedulerEvent::SessionFailed {
                        metadata,
                        session_id,
                        role,
                        issue_id: issue_id.clone(),
                        exit_code: record.exit_code,
                        reason: record
                            .failure_reason
                            .clone()
                            .unwrap_or_else(|| "unknown".to_string()),
                        log_location: record.log_location.clone(),
                    }),
                    SessionStatus::Terminated => Some(SchedulerEvent::SessionTerminated {
                        metadata,
                        session_id,
                        role,
                        issue_id: issue_id.clone(),
                        kind: record.termination.unwrap_or(TerminationKind::Requested),
                    }),
                    _ => None,
                };
                if let Some(event) = event {
                    self.inner.bus.publish(event).await;
                }
                info!(%session_id, status = %record.status, "session finished");
            },
            Err(e) => {
                error!(%session_id, error = %e, "terminal transition could not be persisted");
                self.inner
                    .bus
                    .publish(SchedulerEvent::SchedulerPersistFailure {
                        metadata: EventMetadata::new(correlation.clone()),
                        session_id,
                        error: e.to_string(),
                    })
                    .await;
            },
        }
    }
}

#[async_trait]
impl AgentScheduler for LocalScheduler {
    async fn schedule(&self, task: AgentTask) -> SchedulerResult<SessionId> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SchedulerError::ShuttingDown);
        }

        // Depth is checked before any resource is reserved or spawned.
        let max_depth = self.inner.config.subagent.max_depth;
        if task.metadata.depth > max_depth {
            return Err(SchedulerError::SubagentDepthExceeded {
                depth: task.metadata.depth,
                max: max_depth,
            });
        }

        let adapter = self.inner.engines.get_schedulable(&task.engine)?;

        if let Some(issue) = &task.issue_id {
            // Re-entry returns the existing session for the pair.
            let existing = self
                .inner
                .pairs
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(&(task.role, issue.clone()))
                .copied();
            if let Some(session_id) = existing {
                debug!(%session_id, role = %task.role, issue_id = %issue, "re-entry, returning live session");
                return Ok(session_id);
            }

            if let Err(status) = self.inner.cooldown.check(task.role, issue) {
                self.inner
                    .bus
                    .publish(SchedulerEvent::SchedulerCooldown {
                        metadata: EventMetadata::new(task_correlation(&task)),
                        role: task.role,
                        issue_id: issue.clone(),
                        retry_after_secs: status.retry_after.as_secs(),
                        attempts: status.attempts,
                    })
                    .await;
                return Err(SchedulerError::CooldownActive {
                    role: task.role,
                    issue_id: issue.clone(),
                    retry_after: status.retry_after,
                });
            }
        }

        let permit = if task.metadata.reject_if_full {
            self.inner.quotas.try_acquire(task.role)?
        } else {
            tokio::select! {
                permit = self.inner.quotas.acquire(task.role) => permit?,
                () = self.inner.shutdown.cancelled() => return Err(SchedulerError::ShuttingDown),
            }
        };

        let record = SessionRecord::pending(task);
        let session_id = record.session_id;
        let role = record.task.role;
        let issue_id = record.task.issue_id.clone();

        if let Some(issue) = &issue_id {
            let mut pairs = self
                .inner
                .pairs
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(existing) = pairs.get(&(role, issue.clone())) {
                // Lost a race with a concurrent schedule of the same pair.
                return Ok(*existing);
            }
            pairs.insert((role, issue.clone()), session_id);
        }

        if let Err(e) = self.inner.store.put(&record).await {
            self.inner.remove_pair(role, issue_id.as_ref());
            self.inner
                .bus
                .publish(SchedulerEvent::SchedulerPersistFailure {
                    metadata: EventMetadata::new(task_correlation(&record.task)),
                    session_id,
                    error: e.to_string(),
                })
                .await;
            return Err(e);
        }

        self.spawn_session(record, adapter, permit).await
    }

    async fn terminate(&self, session_id: SessionId) -> SchedulerResult<bool> {
        let handle = {
            let active = self
                .inner
                .active
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            active
                .get(&session_id)
                .map(|h| (h.cancel.clone(), Arc::clone(&h.term_reason)))
        };

        if let Some((cancel, reason)) = handle {
            *reason
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) =
                Some(TerminationKind::Requested);
            cancel.cancel();
            return Ok(true);
        }

        match self.inner.store.get(&session_id).await {
            // Idempotent on terminal sessions: no-op, no duplicate event.
            Some(record) if record.is_terminal() => Ok(false),
            Some(_) => Ok(false),
            None => Err(SchedulerError::SessionNotFound { session_id }),
        }
    }

    async fn get_status(&self, session_id: SessionId) -> Option<SessionStatus> {
        self.inner
            .store
            .get(&session_id)
            .await
            .map(|record| record.status)
    }

    async fn list_active(&self) -> HashMap<SessionId, SessionStatus> {
        self.inner
            .store
            .list_active()
            .await
            .into_iter()
            .map(|record| (record.session_id, record.status))
            .collect()
    }

    async fn get_stats(&self) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        for record in self.inner.store.snapshot().await {
            match record.status {
                SessionStatus::Pending => stats.pending = stats.pending.saturating_add(1),
                SessionStatus::Running => {
                    stats.running = stats.running.saturating_add(1);
                    let count = stats.per_role_running.entry(record.task.role).or_insert(0);
                    *count = count.saturating_add(1);
                    if let Some(age) = record.running_age() {
                        let oldest = stats.oldest_running_age.get_or_insert(age);
                        if age > *oldest {
                            *oldest = age;
                        }
                    }
                },
                SessionStatus::Completed => stats.completed = stats.completed.saturating_add(1),
                SessionStatus::Failed => stats.failed = stats.failed.saturating_add(1),
                SessionStatus::Terminated => {
                    stats.terminated = stats.terminated.saturating_add(1);
                },
            }
        }
        stats
    }
}

/// Correlation id carried by the task, or a fresh one.
fn task_correlation(task: &AgentTask) -> CorrelationId {
    task.metadata
        .extra
        .get("correlation_id")
        .map(|id| CorrelationId::from_string(id.clone()))
        .unwrap_or_default()
}

/// Probe pid liveness with a null signal.
fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

/// Cooperative termination signal.
fn send_sigterm(pid: u32) {
    if let Ok(pid) = i32::try_from(pid) {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid),
            nix::sys::signal::Signal::SIGTERM,
        );
    }
}
