//! Monoco Scheduler - supervised agent processes.
//!
//! The scheduler turns an immutable [`AgentTask`](monoco_core::AgentTask)
//! into a supervised child process with strict lifecycle guarantees:
//!
//! - Per-role and global concurrency quotas with FIFO waiters
//! - Subagent depth limits enforced before any resource is reserved
//! - A persisted session record updated *before* every lifecycle event
//!   publishes (persist failure aborts the transition)
//! - An awaiter task per session that streams output to per-session logs,
//!   awaits exit, and publishes exactly one terminal event
//! - A failure cool-down guard preventing swarm storms per `(role, issue)`
//! - Crash recovery that marks orphaned running sessions as failed

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod cooldown;
mod error;
mod isolation;
mod quota;
mod scheduler;
mod store;

pub use cooldown::{CooldownGuard, CooldownStatus};
pub use error::{SchedulerError, SchedulerResult};
pub use quota::{QuotaPermit, RoleQuotas};
pub use scheduler::{AgentScheduler, LocalScheduler, SchedulerStats};
pub use store::SessionStore;
