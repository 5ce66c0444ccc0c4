//! Monoco Daemon - event handlers and daemon orchestration.
//!
//! The daemon wires the orchestration core together: watchers observe the
//! filesystem and publish typed events; the handlers in this crate consume
//! them and drive the scheduler; scheduler lifecycle events feed back into
//! the same bus, closing the loop (a failed Engineer run triggers the
//! Coroner, issue files produced by the Architect wake the Engineer through
//! the issue watcher, and so on).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod daemon;
pub mod handlers;

pub use daemon::Daemon;
