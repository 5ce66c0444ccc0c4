//! Monoco Mailbox - Maildir-style message store.
//!
//! Messages are plain Markdown files with a YAML front matter envelope,
//! partitioned by provider and state:
//!
//! ```text
//! .monoco/mailbox/
//!   inbound/{provider}/{YYYYMMDDTHHMMSS}_{provider}_{uid}.md
//!   outbound/{provider}/
//!   outbound/{provider}/.sending/     (claimed by a courier)
//!   archive/{provider}/
//!   _rejected/{provider}/             (quarantined malformed files)
//! ```
//!
//! Files in `inbound/` are immutable once committed; every state change is a
//! directory move. Writes go through temp-file + rename so a crash never
//! leaves a partial message visible to watchers.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod envelope;
mod error;
mod store;

pub use envelope::{
    Correlation, MediaKind, Message, MessageEnvelope, Participant, Participants, SessionInfo,
    SessionKind, StoredMessage, format_filename, parse_message, render_message,
};
pub use error::{MailboxError, MailboxResult};
pub use store::{MailboxStore, OutboundClaim};
