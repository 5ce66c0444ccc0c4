//! Directory scaffolding for a monoco workspace.
//!
//! Everything the daemon persists lives under the project's `.monoco/`
//! directory; the human-facing inputs live beside it:
//!
//! ```text
//! <project>/
//! ├── Memos/
//! │   ├── inbox.md                  (memo accumulation, `## [hash]` blocks)
//! │   └── archive.md                (consumed memos)
//! ├── Issues/                       (issue markdown files, YAML headers)
//! └── .monoco/                      (MonocoDirs)
//!     ├── sessions/                 (one JSON file per session)
//!     ├── logs/                     (per-session stdout/stderr streams)
//!     ├── state.json                (daemon state singleton)
//!     ├── config.toml               (workspace config layer)
//!     └── mailbox/
//!         ├── inbound/{provider}/
//!         ├── outbound/{provider}/
//!         │   └── .sending/         (claimed outbound messages)
//!         ├── archive/{provider}/
//!         └── _rejected/{provider}/ (quarantined malformed messages)
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// The `.monoco/` state directory of one workspace.
#[derive(Debug, Clone)]
pub struct MonocoDirs {
    root: PathBuf,
}

impl MonocoDirs {
    /// State directory for the given project root.
    #[must_use]
    pub fn for_workspace(project_root: impl AsRef<Path>) -> Self {
        Self {
            root: project_root.as_ref().join(".monoco"),
        }
    }

    /// Create from an explicit `.monoco` path (useful for testing).
    #[must_use]
    pub fn from_path(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Ensure the directory structure exists.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.sessions_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.mailbox_dir())?;
        Ok(())
    }

    /// Root `.monoco/` path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sessions directory (`.monoco/sessions/`).
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Logs directory (`.monoco/logs/`).
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Log directory for one session (`.monoco/logs/{session_id}/`).
    #[must_use]
    pub fn session_log_dir(&self, session_id: &crate::types::SessionId) -> PathBuf {
        self.logs_dir().join(session_id.to_string())
    }

    /// Mailbox root (`.monoco/mailbox/`).
    #[must_use]
    pub fn mailbox_dir(&self) -> PathBuf {
        self.root.join("mailbox")
    }

    /// Daemon state singleton (`.monoco/state.json`).
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.root.join("state.json")
    }

    /// Workspace configuration layer (`.monoco/config.toml`).
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }
}

/// Human-facing layout of a workspace: memo inbox and issue tree.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    /// Layout rooted at the project directory.
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            root: project_root.into(),
        }
    }

    /// Project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Memo directory (`Memos/`).
    #[must_use]
    pub fn memos_dir(&self) -> PathBuf {
        self.root.join("Memos")
    }

    /// Memo inbox file (`Memos/inbox.md`).
    #[must_use]
    pub fn memo_inbox(&self) -> PathBuf {
        self.memos_dir().join("inbox.md")
    }

    /// Memo archive file (`Memos/archive.md`).
    #[must_use]
    pub fn memo_archive(&self) -> PathBuf {
        self.memos_dir().join("archive.md")
    }

    /// Issue tree root (`Issues/`).
    #[must_use]
    pub fn issues_dir(&self) -> PathBuf {
        self.root.join("Issues")
    }

    /// The `.monoco/` state directory for this workspace.
    #[must_use]
    pub fn monoco(&self) -> MonocoDirs {
        MonocoDirs::for_workspace(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let layout = WorkspaceLayout::new("/proj");
        assert_eq!(layout.memo_inbox(), PathBuf::from("/proj/Memos/inbox.md"));
        assert_eq!(layout.issues_dir(), PathBuf::from("/proj/Issues"));
        assert_eq!(
            layout.monoco().state_path(),
            PathBuf::from("/proj/.monoco/state.json")
        );
    }

    #[test]
    fn test_ensure_creates_tree() {
        let tmp = TempDir::new().unwrap();
        let dirs = MonocoDirs::for_workspace(tmp.path());
        dirs.ensure().unwrap();

        assert!(dirs.sessions_dir().is_dir());
        assert!(dirs.logs_dir().is_dir());
        assert!(dirs.mailbox_dir().is_dir());
    }

    #[test]
    fn test_session_log_dir() {
        let id = crate::types::SessionId::new();
        let dirs = MonocoDirs::from_path("/proj/.monoco");
        let log_dir = dirs.session_log_dir(&id);
        assert!(log_dir.starts_with("/proj/.monoco/logs"));
        assert!(log_dir.ends_with(id.to_string()));
    }
}
