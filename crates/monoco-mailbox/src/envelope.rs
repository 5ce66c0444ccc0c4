//! Message envelope codec.
//!
//! Every message file is UTF-8 text: a YAML front matter delimited by
//! `---\n` at the start and `\n---\n` at the end, followed by a free-form
//! Markdown body. The envelope schema is shared by all providers; provider
//! differences live entirely in their ingress/egress adapters.

use crate::error::{MailboxError, MailboxResult};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// External conversation topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// One-on-one conversation.
    Direct,
    /// Group chat.
    Group,
    /// Threaded reply chain.
    Thread,
    /// Broadcast channel.
    Channel,
}

/// Media kind of the message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Plain text.
    Text,
    /// Markdown.
    Markdown,
    /// Image attachment reference.
    Image,
    /// Generic file attachment reference.
    File,
    /// Audio attachment reference.
    Audio,
    /// Provider-specific interactive card.
    Card,
}

/// The external conversation this message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Provider-scoped conversation id; groups messages of one conversation.
    pub id: String,
    /// Conversation topology.
    #[serde(rename = "type")]
    pub kind: SessionKind,
}

/// One participant of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Provider-scoped user id.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// Sender, recipients, and mentions of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participants {
    /// The author.
    pub sender: Participant,
    /// Direct recipients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<Participant>,
    /// Carbon-copied participants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Participant>,
    /// `@Name` mentions, verbatim.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
}

/// Correlation block spanning a task chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    /// Identifier threaded through all events of one user-visible task.
    pub correlation_id: String,
}

/// Structured header of a mailbox message file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Provider-scoped unique message id.
    pub id: String,
    /// Provider name (e.g. `lark`, `dingtalk`, `email`).
    pub provider: String,
    /// Conversation identity.
    pub session: SessionInfo,
    /// Sender and recipients.
    pub participants: Participants,
    /// Message timestamp, time-zoned (RFC 3339).
    pub timestamp: DateTime<FixedOffset>,
    /// Media kind.
    #[serde(rename = "type")]
    pub media: MediaKind,
    /// Thread grouping key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_key: Option<String>,
    /// Direct parent in the reply tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Root of the reply tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<String>,
    /// Content hashes of attached artifacts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    /// Correlation block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Correlation>,
    /// Message id this one replies to (outbound).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Resolved recipient (outbound, when not a reply).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Delivery attempts so far; added by the courier on failed sends.
    #[serde(
        default,
        rename = "x-retry-count",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_count: Option<u32>,
}

impl MessageEnvelope {
    /// The correlation id, if the message carries one.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation
            .as_ref()
            .map(|c| c.correlation_id.as_str())
    }
}

/// A parsed message: envelope plus Markdown body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Structured header.
    pub envelope: MessageEnvelope,
    /// Free-form Markdown body.
    pub body: String,
}

/// A committed message together with its on-disk location.
///
/// Event payloads carry these by value so handlers never have to re-read
/// mutable state; the path is only used for the final archive move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Where the file currently sits.
    pub path: std::path::PathBuf,
    /// Structured header.
    pub envelope: MessageEnvelope,
    /// Free-form Markdown body.
    pub body: String,
}

/// Parse a message file's content into envelope and body.
///
/// # Errors
///
/// Returns [`MailboxError::MissingFrontMatter`] if the delimiters are absent
/// and [`MailboxError::MalformedFrontMatter`] if the YAML fails to parse.
pub fn parse_message(content: &str) -> MailboxResult<Message> {
    let rest = content
        .strip_prefix("---\n")
        .ok_or(MailboxError::MissingFrontMatter)?;
    let (header, body) = rest
        .split_once("\n---\n")
        .or_else(|| {
            // A file may end right after the closing delimiter.
            rest.strip_suffix("\n---").map(|h| (h, ""))
        })
        .ok_or(MailboxError::MissingFrontMatter)?;

    let envelope: MessageEnvelope = serde_yaml::from_str(header)?;
    Ok(Message {
        envelope,
        body: body.trim_start_matches('\n').to_string(),
    })
}

/// Render an envelope and body into file content.
///
/// # Errors
///
/// Returns an error if the envelope fails to serialize.
pub fn render_message(envelope: &MessageEnvelope, body: &str) -> MailboxResult<String> {
    let header = serde_yaml::to_string(envelope)?;
    Ok(format!("---\n{header}---\n\n{body}"))
}

/// Build the canonical message filename: `{ISO8601-compact}_{provider}_{uid}.md`.
#[must_use]
pub fn format_filename(timestamp: &DateTime<FixedOffset>, provider: &str, uid: &str) -> String {
    format!(
        "{}_{provider}_{uid}.md",
        timestamp.format("%Y%m%dT%H%M%S")
    )
}
