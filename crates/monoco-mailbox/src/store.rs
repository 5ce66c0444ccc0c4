//! The provider-partitioned message store.
//!
//! The daemon and the CLI are the only writers; agents read message content
//! out of their prompts, never from these paths.

use crate::envelope::{Message, MessageEnvelope, format_filename, parse_message, render_message};
use crate::error::{MailboxError, MailboxResult};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Hidden subdirectory of `outbound/{provider}/` holding claimed messages.
const SENDING_DIR: &str = ".sending";

/// Maildir-style store rooted at `.monoco/mailbox/`.
#[derive(Debug, Clone)]
pub struct MailboxStore {
    root: PathBuf,
}

/// Ownership handle for a claimed outbound message.
///
/// Produced by [`MailboxStore::claim_outbound`]; must be returned through
/// [`MailboxStore::release_outbound`] so the file ends up archived or back
/// in the outbound queue.
#[derive(Debug)]
pub struct OutboundClaim {
    /// Where the message sat before the claim.
    original: PathBuf,
    /// Where the message sits while being delivered.
    claimed: PathBuf,
    /// Parsed message content.
    pub message: Message,
}

impl MailboxStore {
    /// Open a store rooted at the given `mailbox/` directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Inbound directory for a provider.
    #[must_use]
    pub fn inbound_dir(&self, provider: &str) -> PathBuf {
        self.root.join("inbound").join(provider)
    }

    /// Outbound directory for a provider.
    #[must_use]
    pub fn outbound_dir(&self, provider: &str) -> PathBuf {
        self.root.join("outbound").join(provider)
    }

    /// Archive directory for a provider.
    #[must_use]
    pub fn archive_dir(&self, provider: &str) -> PathBuf {
        self.root.join("archive").join(provider)
    }

    /// Quarantine directory for a provider.
    #[must_use]
    pub fn rejected_dir(&self, provider: &str) -> PathBuf {
        self.root.join("_rejected").join(provider)
    }

    /// Providers that currently have an inbound directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the inbound root exists but cannot be read.
    pub fn providers(&self) -> MailboxResult<Vec<String>> {
        let inbound = self.root.join("inbound");
        if !inbound.is_dir() {
            return Ok(Vec::new());
        }
        let mut providers = Vec::new();
        for entry in std::fs::read_dir(&inbound)? {
            let entry = entry?;
            if entry.file_type()?.is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                providers.push(name.to_string());
            }
        }
        providers.sort();
        Ok(providers)
    }

    /// Atomically write a new inbound message; returns its committed path.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or the atomic write fails.
    pub fn create_inbound(
        &self,
        provider: &str,
        envelope: &MessageEnvelope,
        body: &str,
    ) -> MailboxResult<PathBuf> {
        let dir = self.inbound_dir(provider);
        self.write_message(&dir, envelope, body)
    }

    /// Atomically write a new outbound message; returns its committed path.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or the atomic write fails.
    pub fn create_outbound(
        &self,
        provider: &str,
        envelope: &MessageEnvelope,
        body: &str,
    ) -> MailboxResult<PathBuf> {
        let dir = self.outbound_dir(provider);
        self.write_message(&dir, envelope, body)
    }

    /// Move a committed message into `archive/{provider}/`, filename preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not inside this store or the move fails.
    pub fn move_to_archive(&self, path: &Path) -> MailboxResult<PathBuf> {
        let provider = self.provider_of(path)?;
        let file_name = file_name_of(path)?;
        let dest_dir = self.archive_dir(&provider);
        std::fs::create_dir_all(&dest_dir)?;
        let dest = dest_dir.join(file_name);
        std::fs::rename(path, &dest)?;
        debug!(from = %path.display(), to = %dest.display(), "archived message");
        Ok(dest)
    }

    /// Quarantine a malformed file into `_rejected/{provider}/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not inside this store or the move fails.
    pub fn quarantine(&self, path: &Path) -> MailboxResult<PathBuf> {
        let provider = self.provider_of(path)?;
        let file_name = file_name_of(path)?;
        let dest_dir = self.rejected_dir(&provider);
        std::fs::create_dir_all(&dest_dir)?;
        let dest = dest_dir.join(file_name);
        std::fs::rename(path, &dest)?;
        warn!(from = %path.display(), to = %dest.display(), "quarantined malformed message");
        Ok(dest)
    }

    /// Claim an outbound message for delivery.
    ///
    /// Renames the file into the hidden `.sending/` sibling so concurrent
    /// courier instances cannot double-deliver, then parses it.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails (including when another courier
    /// already claimed the file) or the content is malformed.
    pub fn claim_outbound(&self, path: &Path) -> MailboxResult<OutboundClaim> {
        let provider = self.provider_of(path)?;
        let file_name = file_name_of(path)?;
        let sending_dir = self.outbound_dir(&provider).join(SENDING_DIR);
        std::fs::create_dir_all(&sending_dir)?;
        let claimed = sending_dir.join(file_name);
        std::fs::rename(path, &claimed)?;

        let content = std::fs::read_to_string(&claimed)?;
        let message = parse_message(&content)?;
        Ok(OutboundClaim {
            original: path.to_path_buf(),
            claimed,
            message,
        })
    }

    /// Finish a claim: archive on success, restore with an incremented
    /// `x-retry-count` on failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the final move or the rewrite fails.
    pub fn release_outbound(&self, claim: OutboundClaim, success: bool) -> MailboxResult<PathBuf> {
        if success {
            return self.move_to_archive(&claim.claimed);
        }

        let mut envelope = claim.message.envelope;
        envelope.retry_count = Some(envelope.retry_count.unwrap_or(0).saturating_add(1));
        let content = render_message(&envelope, &claim.message.body)?;

        write_atomic_in(&claim.original, content.as_bytes())?;
        std::fs::remove_file(&claim.claimed)?;
        warn!(
            path = %claim.original.display(),
            retry_count = envelope.retry_count.unwrap_or(1),
            "outbound delivery failed, restored to queue"
        );
        Ok(claim.original)
    }

    /// List committed inbound message paths for a provider, filename-sorted.
    ///
    /// Filename order is chronological because names start with the compact
    /// ISO 8601 timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn list_inbound(&self, provider: &str) -> MailboxResult<Vec<PathBuf>> {
        list_messages(&self.inbound_dir(provider))
    }

    /// List queued outbound message paths for a provider, filename-sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn list_outbound(&self, provider: &str) -> MailboxResult<Vec<PathBuf>> {
        list_messages(&self.outbound_dir(provider))
    }

    fn write_message(
        &self,
        dir: &Path,
        envelope: &MessageEnvelope,
        body: &str,
    ) -> MailboxResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let content = render_message(envelope, body)?;
        let dest = dir.join(format_filename(
            &envelope.timestamp,
            &envelope.provider,
            &envelope.id,
        ));
        write_atomic_in(&dest, content.as_bytes())?;
        debug!(path = %dest.display(), "committed message");
        Ok(dest)
    }

    /// Derive the provider from a path inside this store.
    ///
    /// Accepts paths of the form `{root}/{state}/{provider}/...`.
    fn provider_of(&self, path: &Path) -> MailboxResult<String> {
        let rel = path
            .strip_prefix(&self.root)
            .map_err(|_| MailboxError::ForeignPath {
                path: path.to_path_buf(),
            })?;
        let mut components = rel.components();
        let _state = components.next();
        components
            .next()
            .and_then(|c| c.as_os_str().to_str())
            .map(ToString::to_string)
            .ok_or_else(|| MailboxError::UnknownProvider {
                path: path.to_path_buf(),
            })
    }
}

fn file_name_of(path: &Path) -> MailboxResult<&std::ffi::OsStr> {
    path.file_name().ok_or_else(|| MailboxError::ForeignPath {
        path: path.to_path_buf(),
    })
}

/// Write-to-temp + rename inside the destination's directory.
fn write_atomic_in(dest: &Path, contents: &[u8]) -> MailboxResult<()> {
    let dir = dest.parent().ok_or_else(|| MailboxError::ForeignPath {
        path: dest.to_path_buf(),
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| MailboxError::Io(e.error))?;
    Ok(())
}

fn list_messages(dir: &Path) -> MailboxResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some("md")
        {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{
        Correlation, MediaKind, Participant, Participants, SessionInfo, SessionKind,
    };
    use tempfile::TempDir;

    fn envelope(id: &str, provider: &str) -> MessageEnvelope {
        MessageEnvelope {
            id: id.to_string(),
            provider: provider.to_string(),
            session: SessionInfo {
                id: "chat_1".to_string(),
                kind: SessionKind::Direct,
            },
            participants: Participants {
                sender: Participant {
                    id: "u1".to_string(),
                    name: "Ada".to_string(),
                },
                recipients: Vec::new(),
                cc: Vec::new(),
                mentions: Vec::new(),
            },
            timestamp: "2026-02-10T10:00:00+00:00".parse().unwrap(),
            media: MediaKind::Text,
            thread_key: None,
            parent_id: None,
            root_id: None,
            artifacts: Vec::new(),
            correlation: Some(Correlation {
                correlation_id: "corr-1".to_string(),
            }),
            reply_to: Some("m0".to_string()),
            to: None,
            retry_count: None,
        }
    }

    #[test]
    fn test_create_inbound_commits_parseable_file() {
        let tmp = TempDir::new().unwrap();
        let store = MailboxStore::new(tmp.path());

        let path = store
            .create_inbound("lark", &envelope("m1", "lark"), "hello")
            .unwrap();
        assert!(path.starts_with(store.inbound_dir("lark")));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "20260210T100000_lark_m1.md"
        );

        let message = parse_message(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(message.body, "hello");
        assert_eq!(message.envelope.id, "m1");
    }

    #[test]
    fn test_archive_preserves_filename() {
        let tmp = TempDir::new().unwrap();
        let store = MailboxStore::new(tmp.path());

        let path = store
            .create_inbound("lark", &envelope("m1", "lark"), "hello")
            .unwrap();
        let archived = store.move_to_archive(&path).unwrap();

        assert!(!path.exists());
        assert!(archived.exists());
        assert_eq!(archived.file_name(), path.file_name());
        assert!(archived.starts_with(store.archive_dir("lark")));
    }

    #[test]
    fn test_quarantine_moves_to_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = MailboxStore::new(tmp.path());

        let dir = store.inbound_dir("dingtalk");
        std::fs::create_dir_all(&dir).unwrap();
        let bad = dir.join("20260210T100000_dingtalk_bad.md");
        std::fs::write(&bad, "no front matter").unwrap();

        let rejected = store.quarantine(&bad).unwrap();
        assert!(!bad.exists());
        assert!(rejected.starts_with(store.rejected_dir("dingtalk")));
    }

    #[test]
    fn test_claim_release_success_archives() {
        let tmp = TempDir::new().unwrap();
        let store = MailboxStore::new(tmp.path());

        let path = store
            .create_outbound("email", &envelope("m2", "email"), "reply body")
            .unwrap();
        let claim = store.claim_outbound(&path).unwrap();
        assert!(!path.exists());
        assert_eq!(claim.message.body, "reply body");

        let archived = store.release_outbound(claim, true).unwrap();
        assert!(archived.starts_with(store.archive_dir("email")));
    }

    #[test]
    fn test_claim_release_failure_increments_retry_count() {
        let tmp = TempDir::new().unwrap();
        let store = MailboxStore::new(tmp.path());

        let path = store
            .create_outbound("email", &envelope("m3", "email"), "reply")
            .unwrap();

        // First failed delivery.
        let claim = store.claim_outbound(&path).unwrap();
        let restored = store.release_outbound(claim, false).unwrap();
        assert_eq!(restored, path);
        let message = parse_message(&std::fs::read_to_string(&restored).unwrap()).unwrap();
        assert_eq!(message.envelope.retry_count, Some(1));

        // Second failed delivery.
        let claim = store.claim_outbound(&path).unwrap();
        let restored = store.release_outbound(claim, false).unwrap();
        let message = parse_message(&std::fs::read_to_string(&restored).unwrap()).unwrap();
        assert_eq!(message.envelope.retry_count, Some(2));
    }

    #[test]
    fn test_double_claim_fails() {
        let tmp = TempDir::new().unwrap();
        let store = MailboxStore::new(tmp.path());

        let path = store
            .create_outbound("email", &envelope("m4", "email"), "x")
            .unwrap();
        let _claim = store.claim_outbound(&path).unwrap();

        // File is gone from outbound/ — a concurrent courier loses the race.
        assert!(store.claim_outbound(&path).is_err());
    }

    #[test]
    fn test_list_inbound_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        let store = MailboxStore::new(tmp.path());

        let mut late = envelope("m9", "lark");
        late.timestamp = "2026-02-10T11:00:00+00:00".parse().unwrap();
        store.create_inbound("lark", &late, "later").unwrap();
        store
            .create_inbound("lark", &envelope("m1", "lark"), "earlier")
            .unwrap();
        // Non-message files are ignored.
        std::fs::write(store.inbound_dir("lark").join("notes.txt"), "x").unwrap();

        let listed = store.list_inbound("lark").unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].file_name().unwrap().to_str().unwrap() < listed[1]
            .file_name()
            .unwrap()
            .to_str()
            .unwrap());
    }

    #[test]
    fn test_providers_enumeration() {
        let tmp = TempDir::new().unwrap();
        let store = MailboxStore::new(tmp.path());
        assert!(store.providers().unwrap().is_empty());

        store
            .create_inbound("lark", &envelope("m1", "lark"), "a")
            .unwrap();
        store
            .create_inbound("email", &envelope("m2", "email"), "b")
            .unwrap();
        assert_eq!(store.providers().unwrap(), vec!["email", "lark"]);
    }

    #[test]
    fn test_foreign_path_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = MailboxStore::new(tmp.path().join("mailbox"));
        let err = store
            .move_to_archive(Path::new("/elsewhere/msg.md"))
            .unwrap_err();
        assert!(matches!(err, MailboxError::ForeignPath { .. }));
    }
}
