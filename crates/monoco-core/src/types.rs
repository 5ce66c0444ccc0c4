//! Common identifiers and enums used throughout monoco.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a scheduled session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a session ID from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Unique identifier for an agent task (one scheduler invocation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new random task ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a task ID from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an issue file (e.g. `FEAT-0042`), taken from its YAML header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueId(pub String);

impl IssueId {
    /// Wrap a raw issue identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for IssueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Correlation id threaded through all events and messages of one task chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// Generate a fresh correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an id carried by an external message.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed label identifying what an agent is expected to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Turns accumulated memos and inbound conversations into issues.
    Architect,
    /// Implements issues that enter the `doing` stage.
    Engineer,
    /// Reviews pull requests.
    Reviewer,
    /// Performs autopsies on failed sessions.
    Coroner,
    /// Conversational front desk for inbound mailbox traffic (aka "prime").
    Mailbox,
}

impl Role {
    /// All roles, in a stable order.
    pub const ALL: [Self; 5] = [
        Self::Architect,
        Self::Engineer,
        Self::Reviewer,
        Self::Coroner,
        Self::Mailbox,
    ];

    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::Engineer => "engineer",
            Self::Reviewer => "reviewer",
            Self::Coroner => "coroner",
            Self::Mailbox => "mailbox",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "architect" => Ok(Self::Architect),
            "engineer" => Ok(Self::Engineer),
            "reviewer" => Ok(Self::Reviewer),
            "coroner" => Ok(Self::Coroner),
            // "prime" is the conversational alias used in chat mentions.
            "mailbox" | "prime" => Ok(Self::Mailbox),
            other => Err(crate::error::CoreError::UnknownRole {
                role: other.to_string(),
            }),
        }
    }
}

/// Lifecycle state of a session.
///
/// Transitions are monotone: `Pending → Running → {Completed, Failed,
/// Terminated}`. Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepted but not yet spawned.
    Pending,
    /// Child process is alive.
    Running,
    /// Process exited with code 0 (outside the spawn-failure window).
    Completed,
    /// Process exited non-zero, failed to spawn, or died within the spawn window.
    Failed,
    /// Terminated on request (operator, timeout, or shutdown).
    Terminated,
}

impl SessionStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Terminated)
    }

    /// Whether a transition from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Failed | Self::Terminated),
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Terminated => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_roundtrip() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("architect".parse::<Role>().unwrap(), Role::Architect);
        assert_eq!("Engineer".parse::<Role>().unwrap(), Role::Engineer);
        assert_eq!("prime".parse::<Role>().unwrap(), Role::Mailbox);
        assert_eq!("mailbox".parse::<Role>().unwrap(), Role::Mailbox);
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn test_status_transitions_monotone() {
        use SessionStatus::*;

        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(Terminated));

        // No re-entry from terminal states.
        for terminal in [Completed, Failed, Terminated] {
            assert!(terminal.is_terminal());
            for next in [Pending, Running, Completed, Failed, Terminated] {
                assert!(!terminal.can_transition_to(next));
            }
        }

        // No skipping backwards.
        assert!(!Running.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_role_serde_snake_case() {
        let json = serde_json::to_string(&Role::Coroner).unwrap();
        assert_eq!(json, "\"coroner\"");
    }
}
