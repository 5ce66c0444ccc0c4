//! Monoco Router - inbound message routing.
//!
//! The router turns a conversation context (latest inbound batch plus recent
//! history) into a target role. Rules are evaluated in descending priority;
//! the first match wins. A `fallback` rule targeting the Architect is seeded
//! at startup if the configuration carries none, so routing always
//! terminates in one pass.
//!
//! Rules are copy-on-write: a reload compiles a fresh immutable rule list
//! and swaps the reference, taking effect on the next routing decision.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod context;
mod error;
mod router;
mod rule;

pub use context::{ContextCache, ConversationContext, DEFAULT_HISTORY_CAP};
pub use error::{RouteError, RouteResult};
pub use router::{MessageRouter, RouteDecision};
pub use rule::{RoutingRule, RuleKind};
