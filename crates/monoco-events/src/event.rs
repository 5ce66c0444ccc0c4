//! The closed event set.
//!
//! Every event carries its full context by value so handlers never read
//! mutable state after the fact. Events are ephemeral: they are logged, never
//! persisted.

use chrono::{DateTime, Utc};
use monoco_core::session::TerminationKind;
use monoco_core::{CorrelationId, IssueId, Role, SessionId};
use monoco_mailbox::StoredMessage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Timestamp and correlation id attached to every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// When the event was published.
    pub timestamp: DateTime<Utc>,
    /// Task-chain correlation id.
    pub correlation_id: CorrelationId,
}

impl EventMetadata {
    /// Metadata carrying an existing correlation id.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            timestamp: Utc::now(),
            correlation_id,
        }
    }

    /// Metadata with a freshly generated correlation id.
    #[must_use]
    pub fn fresh() -> Self {
        Self::new(CorrelationId::new())
    }
}

/// One memo block from `Memos/inbox.md`, delimited by a `## [hash]` heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoEntry {
    /// The short hash inside the heading brackets.
    pub hash: String,
    /// Memo text below the heading.
    pub body: String,
}

/// Discriminant of a [`SchedulerEvent`], used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new memo appeared in the inbox.
    MemoCreated,
    /// The unprocessed memo count reached the threshold.
    MemoThreshold,
    /// A batch of inbound messages finished its debounce window.
    MailboxInboundReceived,
    /// An agent asked for an outbound message to be delivered.
    MailboxOutboundRequested,
    /// An inbound file failed front-matter parsing and was quarantined.
    MailboxMalformed,
    /// A new issue file appeared.
    IssueCreated,
    /// An issue's `stage` header changed.
    IssueStageChanged,
    /// An issue reached the `closed` stage.
    IssueClosed,
    /// A session's child process spawned.
    SessionStarted,
    /// A session exited with code 0.
    SessionCompleted,
    /// A session failed (spawn failure or non-zero exit).
    SessionFailed,
    /// A session was terminated (request, timeout, or shutdown).
    SessionTerminated,
    /// A pull request was created (externally emitted).
    PrCreated,
    /// An explicit handover between roles was requested.
    HandoverRequested,
    /// The bus dropped events because a queue stayed full.
    SchedulerOverload,
    /// A handler raised an error.
    SchedulerHandlerFailure,
    /// A session state transition could not be persisted.
    SchedulerPersistFailure,
    /// A schedule request was refused by the failure cool-down guard.
    SchedulerCooldown,
}

/// A typed event on the scheduler bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// A new memo appeared in the inbox.
    MemoCreated {
        /// Event metadata.
        metadata: EventMetadata,
        /// Unprocessed memo count after the addition.
        count: usize,
    },
    /// The unprocessed memo count reached the threshold.
    MemoThreshold {
        /// Event metadata.
        metadata: EventMetadata,
        /// All unprocessed memos, in file order.
        memos: Vec<MemoEntry>,
    },
    /// A debounced batch of inbound messages for one external session.
    MailboxInboundReceived {
        /// Event metadata.
        metadata: EventMetadata,
        /// Provider the batch arrived through.
        provider: String,
        /// External conversation id shared by the batch.
        session_id: String,
        /// Messages in arrival order.
        messages: Vec<StoredMessage>,
    },
    /// An agent asked for an outbound message to be delivered.
    MailboxOutboundRequested {
        /// Event metadata.
        metadata: EventMetadata,
        /// Provider to deliver through.
        provider: String,
        /// Path of the queued outbound file.
        path: PathBuf,
    },
    /// An inbound file failed front-matter parsing and was quarantined.
    MailboxMalformed {
        /// Event metadata.
        metadata: EventMetadata,
        /// Provider directory the file arrived in.
        provider: String,
        /// Where the file now sits (under `_rejected/`).
        quarantined_path: PathBuf,
        /// Parse error description.
        error: String,
    },
    /// A new issue file appeared.
    IssueCreated {
        /// Event metadata.
        metadata: EventMetadata,
        /// Issue identifier from the YAML header.
        issue_id: IssueId,
        /// Initial stage.
        stage: String,
        /// Path of the issue file.
        path: PathBuf,
    },
    /// An issue's `stage` header changed.
    IssueStageChanged {
        /// Event metadata.
        metadata: EventMetadata,
        /// Issue identifier.
        issue_id: IssueId,
        /// Previous stage.
        from_stage: String,
        /// New stage.
        to_stage: String,
    },
    /// An issue reached the `closed` stage.
    IssueClosed {
        /// Event metadata.
        metadata: EventMetadata,
        /// Issue identifier.
        issue_id: IssueId,
    },
    /// A session's child process spawned.
    SessionStarted {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session.
        session_id: SessionId,
        /// Role of the spawned agent.
        role: Role,
        /// Issue the session works on, if any.
        issue_id: Option<IssueId>,
        /// OS process id.
        pid: u32,
    },
    /// A session exited with code 0.
    SessionCompleted {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session.
        session_id: SessionId,
        /// Role of the agent.
        role: Role,
        /// Issue the session worked on, if any.
        issue_id: Option<IssueId>,
    },
    /// A session failed: spawn failure, non-zero exit, or death within the
    /// spawn window.
    SessionFailed {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session.
        session_id: SessionId,
        /// Role of the agent.
        role: Role,
        /// Issue the session worked on, if any.
        issue_id: Option<IssueId>,
        /// Exit code, when the process got far enough to exit.
        exit_code: Option<i32>,
        /// Failure reason (`spawn_failure`, `daemon_restart`, ...).
        reason: String,
        /// Directory holding the session's stdout/stderr streams.
        log_location: Option<PathBuf>,
    },
    /// A session was terminated.
    SessionTerminated {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session.
        session_id: SessionId,
        /// Role of the agent.
        role: Role,
        /// Issue the session worked on, if any.
        issue_id: Option<IssueId>,
        /// What triggered the termination.
        kind: TerminationKind,
    },
    /// A pull request was created (externally emitted).
    PrCreated {
        /// Event metadata.
        metadata: EventMetadata,
        /// Issue the pull request belongs to, if known.
        issue_id: Option<IssueId>,
        /// Pull request URL.
        pr_url: String,
    },
    /// An explicit handover between roles was requested.
    HandoverRequested {
        /// Event metadata.
        metadata: EventMetadata,
        /// Role handing over.
        from_role: Role,
        /// Role taking over.
        to_role: Role,
        /// Issue concerned, if any.
        issue_id: Option<IssueId>,
    },
    /// The bus dropped events because a queue stayed full.
    SchedulerOverload {
        /// Event metadata.
        metadata: EventMetadata,
        /// How many deliveries were dropped.
        dropped: usize,
    },
    /// A handler raised an error.
    SchedulerHandlerFailure {
        /// Event metadata.
        metadata: EventMetadata,
        /// Name of the failing handler.
        handler: String,
        /// Error description.
        error: String,
    },
    /// A session state transition could not be persisted.
    SchedulerPersistFailure {
        /// Event metadata.
        metadata: EventMetadata,
        /// The session whose transition was aborted.
        session_id: SessionId,
        /// Error description.
        error: String,
    },
    /// A schedule request was refused by the failure cool-down guard.
    SchedulerCooldown {
        /// Event metadata.
        metadata: EventMetadata,
        /// Role that was refused.
        role: Role,
        /// Issue the refusal applies to.
        issue_id: IssueId,
        /// Seconds until scheduling may resume.
        retry_after_secs: u64,
        /// Failure attempts recorded so far.
        attempts: u32,
    },
}

impl SchedulerEvent {
    /// The event's kind discriminant.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MemoCreated { .. } => EventKind::MemoCreated,
            Self::MemoThreshold { .. } => EventKind::MemoThreshold,
            Self::MailboxInboundReceived { .. } => EventKind::MailboxInboundReceived,
            Self::MailboxOutboundRequested { .. } => EventKind::MailboxOutboundRequested,
            Self::MailboxMalformed { .. } => EventKind::MailboxMalformed,
            Self::IssueCreated { .. } => EventKind::IssueCreated,
            Self::IssueStageChanged { .. } => EventKind::IssueStageChanged,
            Self::IssueClosed { .. } => EventKind::IssueClosed,
            Self::SessionStarted { .. } => EventKind::SessionStarted,
            Self::SessionCompleted { .. } => EventKind::SessionCompleted,
            Self::SessionFailed { .. } => EventKind::SessionFailed,
            Self::SessionTerminated { .. } => EventKind::SessionTerminated,
            Self::PrCreated { .. } => EventKind::PrCreated,
            Self::HandoverRequested { .. } => EventKind::HandoverRequested,
            Self::SchedulerOverload { .. } => EventKind::SchedulerOverload,
            Self::SchedulerHandlerFailure { .. } => EventKind::SchedulerHandlerFailure,
            Self::SchedulerPersistFailure { .. } => EventKind::SchedulerPersistFailure,
            Self::SchedulerCooldown { .. } => EventKind::SchedulerCooldown,
        }
    }

    /// Snake-case name of the event type.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self.kind() {
            EventKind::MemoCreated => "memo_created",
            EventKind::MemoThreshold => "memo_threshold",
            EventKind::MailboxInboundReceived => "mailbox_inbound_received",
            EventKind::MailboxOutboundRequested => "mailbox_outbound_requested",
            EventKind::MailboxMalformed => "mailbox_malformed",
            EventKind::IssueCreated => "issue_created",
            EventKind::IssueStageChanged => "issue_stage_changed",
            EventKind::IssueClosed => "issue_closed",
            EventKind::SessionStarted => "session_started",
            EventKind::SessionCompleted => "session_completed",
            EventKind::SessionFailed => "session_failed",
            EventKind::SessionTerminated => "session_terminated",
            EventKind::PrCreated => "pr_created",
            EventKind::HandoverRequested => "handover_requested",
            EventKind::SchedulerOverload => "scheduler_overload",
            EventKind::SchedulerHandlerFailure => "scheduler_handler_failure",
            EventKind::SchedulerPersistFailure => "scheduler_persist_failure",
            EventKind::SchedulerCooldown => "scheduler_cooldown",
        }
    }

    /// The event's metadata.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::MemoCreated { metadata, .. }
            | Self::MemoThreshold { metadata, .. }
            | Self::MailboxInboundReceived { metadata, .. }
            | Self::MailboxOutboundRequested { metadata, .. }
            | Self::MailboxMalformed { metadata, .. }
            | Self::IssueCreated { metadata, .. }
            | Self::IssueStageChanged { metadata, .. }
            | Self::IssueClosed { metadata, .. }
            | Self::SessionStarted { metadata, .. }
            | Self::SessionCompleted { metadata, .. }
            | Self::SessionFailed { metadata, .. }
            | Self::SessionTerminated { metadata, .. }
            | Self::PrCreated { metadata, .. }
            | Self::HandoverRequested { metadata, .. }
            | Self::SchedulerOverload { metadata, .. }
            | Self::SchedulerHandlerFailure { metadata, .. }
            | Self::SchedulerPersistFailure { metadata, .. }
            | Self::SchedulerCooldown { metadata, .. } => metadata,
        }
    }
}
