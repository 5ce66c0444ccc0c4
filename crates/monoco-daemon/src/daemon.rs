//! Daemon assembly: wiring, startup, recovery, shutdown.

use crate::handlers::{
    ArchitectHandler, CoronerHandler, DEFAULT_DECISION_TIMEOUT, EngineerHandler,
    EventHandler, HandoverPolicyHandler, MailboxAgentHandler, ReviewerHandler, spawn_handler,
};
use monoco_core::session::TerminationKind;
use monoco_core::{DaemonState, MonocoDirs, WorkspaceLayout};
use monoco_engine::EngineRegistry;
use monoco_events::{Broadcaster, EventBus};
use monoco_mailbox::MailboxStore;
use monoco_router::{ContextCache, MessageRouter};
use monoco_scheduler::{AgentScheduler, LocalScheduler, SessionStore};
use monoco_watchers::{IssueWatcher, MailboxWatcher, MemoWatcher, run_supervised};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Bounded wait for handlers to drain at shutdown.
const HANDLER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded wait for terminated sessions to finish at shutdown.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(25);

/// The assembled workspace daemon.
pub struct Daemon {
    config: monoco_config::Config,
    layout: WorkspaceLayout,
    dirs: MonocoDirs,
    bus: EventBus,
    scheduler: LocalScheduler,
    router: Arc<MessageRouter>,
    cache: Arc<ContextCache>,
    mailbox: MailboxStore,
    broadcaster: Broadcaster,
    healthy: Arc<AtomicBool>,
    shutdown: CancellationToken,
    watchers_token: CancellationToken,
    handlers_token: CancellationToken,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    broadcast_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Daemon {
    /// Wire the daemon for a workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directories cannot be created, the
    /// session store cannot open, or the routing rules fail to compile.
    pub fn new(project_root: &Path, config: monoco_config::Config) -> anyhow::Result<Self> {
        let layout = WorkspaceLayout::new(project_root);
        let dirs = layout.monoco();
        dirs.ensure()?;

        let bus = EventBus::new();
        let engines = Arc::new(EngineRegistry::from_config(&config.engines));
        let store = Arc::new(SessionStore::open(dirs.sessions_dir())?);
        let scheduler = LocalScheduler::new(
            layout.root(),
            dirs.logs_dir(),
            config.scheduler.clone(),
            engines,
            store,
            bus.clone(),
        );
        let router = Arc::new(MessageRouter::from_config(&config.routing.rules)?);
        let mailbox = MailboxStore::new(dirs.mailbox_dir());

        let shutdown = CancellationToken::new();
        Ok(Self {
            config,
            layout,
            dirs,
            bus,
            scheduler,
            router,
            cache: Arc::new(ContextCache::new()),
            mailbox,
            broadcaster: Broadcaster::new(),
            healthy: Arc::new(AtomicBool::new(true)),
            watchers_token: shutdown.child_token(),
            handlers_token: shutdown.child_token(),
            shutdown,
            tasks: std::sync::Mutex::new(Vec::new()),
            broadcast_task: std::sync::Mutex::new(None),
        })
    }

    /// The daemon's event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The daemon's scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &LocalScheduler {
        &self.scheduler
    }

    /// The external-consumer broadcaster.
    #[must_use]
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Whether all watchers are healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Token that stops the daemon when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Recover persisted state and start watchers, handlers, and the
    /// broadcaster.
    ///
    /// # Errors
    ///
    /// Returns an error if the state singleton cannot be written or
    /// recovery fails.
    pub async fn start(&self) -> anyhow::Result<()> {
        let state_path = self.dirs.state_path();
        let mut state = DaemonState::load(&state_path)?;
        state.started_at = Some(chrono::Utc::now());
        state.last_active_project_id = Some(self.layout.root().display().to_string());
        state.save(&state_path)?;

        self.scheduler.recover().await?;

        *self
            .broadcast_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(tokio::spawn(
            self.broadcaster.clone().run(self.bus.subscribe_all()),
        ));

        let mut tasks = Vec::new();
        tasks.extend(self.spawn_watchers());
        tasks.extend(self.spawn_handlers());

        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend(tasks);
        info!(workspace = %self.layout.root().display(), "daemon started");
        Ok(())
    }

    fn spawn_watchers(&self) -> Vec<JoinHandle<()>> {
        let watchers = &self.config.watchers;
        let force_polling = watchers.force_polling;
        let poll_interval = watchers.poll_interval();

        let memo_inbox = self.layout.memo_inbox();
        let memo_threshold = watchers.memo.threshold;
        let memo_bus = self.bus.clone();
        let memo_token = self.watchers_token.clone();
        let memo_health = Arc::clone(&self.healthy);
        let memo = tokio::spawn(async move {
            run_supervised("memo", memo_token.clone(), memo_health, move || {
                MemoWatcher::new(
                    memo_inbox.clone(),
                    memo_threshold,
                    memo_bus.clone(),
                    force_polling,
                    poll_interval,
                )
                .run(memo_token.clone())
            })
            .await;
        });

        let issues_dir = self.layout.issues_dir();
        let issue_bus = self.bus.clone();
        let issue_token = self.watchers_token.clone();
        let issue_health = Arc::clone(&self.healthy);
        let issue = tokio::spawn(async move {
            run_supervised("issue", issue_token.clone(), issue_health, move || {
                IssueWatcher::new(
                    issues_dir.clone(),
                    issue_bus.clone(),
                    force_polling,
                    poll_interval,
                )
                .run(issue_token.clone())
            })
            .await;
        });

        let mailbox_store = self.mailbox.clone();
        let debounce = watchers.mailbox.clone();
        let mailbox_bus = self.bus.clone();
        let mailbox_token = self.watchers_token.clone();
        let mailbox_health = Arc::clone(&self.healthy);
        let mailbox = tokio::spawn(async move {
            run_supervised("mailbox", mailbox_token.clone(), mailbox_health, move || {
                MailboxWatcher::new(
                    mailbox_store.clone(),
                    debounce.clone(),
                    mailbox_bus.clone(),
                    force_polling,
                    poll_interval,
                )
                .run(mailbox_token.clone())
            })
            .await;
        });

        vec![memo, issue, mailbox]
    }

    fn spawn_handlers(&self) -> Vec<JoinHandle<()>> {
        let scheduler: Arc<dyn AgentScheduler> = Arc::new(self.scheduler.clone());
        let engine = self.config.scheduler.default_engine.clone();

        let handlers: Vec<Arc<dyn EventHandler>> = vec![
            Arc::new(ArchitectHandler::new(
                Arc::clone(&scheduler),
                self.layout.clone(),
                engine.clone(),
                self.config.watchers.memo.min_gap(),
            )),
            Arc::new(EngineerHandler::new(Arc::clone(&scheduler), engine.clone())),
            Arc::new(ReviewerHandler::new(Arc::clone(&scheduler), engine.clone())),
            Arc::new(CoronerHandler::new(
                Arc::clone(&scheduler),
                self.scheduler.store(),
                engine.clone(),
            )),
            Arc::new(MailboxAgentHandler::new(
                Arc::clone(&scheduler),
                Arc::clone(&self.router),
                Arc::clone(&self.cache),
                self.mailbox.clone(),
                engine,
                true,
            )),
            Arc::new(HandoverPolicyHandler),
        ];

        handlers
            .into_iter()
            .map(|handler| {
                spawn_handler(
                    &self.bus,
                    handler,
                    self.handlers_token.clone(),
                    DEFAULT_DECISION_TIMEOUT,
                )
            })
            .collect()
    }

    /// Block until an interrupt or an external shutdown request.
    pub async fn wait(&self) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("interrupt received"),
            () = self.shutdown.cancelled() => {},
        }
    }

    /// Orderly shutdown: stop intake, cancel watchers, drain handlers,
    /// terminate sessions, persist final state.
    pub async fn stop(&self) {
        info!("shutting down");

        // 1. Stop accepting new work.
        self.scheduler.close();

        // 2. Cancel watchers (no further events enter the bus).
        self.watchers_token.cancel();

        // 3. Give handlers a bounded window to finish current decisions.
        self.handlers_token.cancel();
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain(..)
            .collect();
        let drain = async {
            for task in tasks {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(HANDLER_DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("handlers did not drain in time");
        }

        // 4. Terminate running sessions, cooperative first.
        self.scheduler.terminate_all(TerminationKind::Shutdown);
        if !self.scheduler.wait_idle(SESSION_DRAIN_TIMEOUT).await {
            warn!("sessions did not drain in time");
        }

        // The broadcaster is a passive projection; cut it last.
        if let Some(task) = self
            .broadcast_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            task.abort();
        }

        // 5. Final state persist.
        let state_path = self.dirs.state_path();
        match DaemonState::load(&state_path) {
            Ok(state) => {
                if let Err(e) = state.save(&state_path) {
                    warn!(error = %e, "failed to persist final state");
                }
            },
            Err(e) => warn!(error = %e, "failed to load state for final persist"),
        }

        self.shutdown.cancel();
        info!("daemon stopped");
    }

    /// Start, wait for a stop signal, shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if startup fails.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.start().await?;
        self.wait().await;
        self.stop().await;
        Ok(())
    }
}
