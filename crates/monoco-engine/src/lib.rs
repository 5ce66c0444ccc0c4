//! Monoco Engine - adapter registry for agent providers.
//!
//! An engine is the LLM-backed CLI an agent session runs on (gemini, claude,
//! kimi, ...). Each adapter knows how to turn a prompt into an argv and
//! whether the provider can run without interactive confirmation. The
//! scheduler refuses engines that cannot run unattended.
//!
//! The registry is seeded from the built-in adapters plus the `engines.*`
//! configuration sections and is immutable after startup.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod adapter;
mod error;
mod registry;

pub use adapter::{CliAdapter, EngineAdapter, EngineCommand};
pub use error::{EngineError, EngineResult};
pub use registry::EngineRegistry;
