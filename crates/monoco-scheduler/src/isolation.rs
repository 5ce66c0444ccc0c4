//! Working-directory isolation for spawned agents.
//!
//! The scheduler supports three strategies per `task.metadata.isolation`:
//! running in the project root, checking out a feature branch, or adding a
//! dedicated git worktree. Git failures degrade to the project root with a
//! warning — isolation is best-effort, supervision is not.

use monoco_core::{Isolation, SessionId};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

/// Resolve the working directory for a session.
pub(crate) async fn prepare_workdir(
    project_root: &Path,
    session_id: &SessionId,
    isolation: Isolation,
) -> PathBuf {
    match isolation {
        Isolation::Root => project_root.to_path_buf(),
        Isolation::Branch => {
            let branch = branch_name(session_id);
            match git(project_root, &["checkout", "-B", &branch]).await {
                Ok(()) => {
                    debug!(%branch, "checked out feature branch");
                    project_root.to_path_buf()
                },
                Err(e) => {
                    warn!(%branch, error = %e, "branch checkout failed, using project root");
                    project_root.to_path_buf()
                },
            }
        },
        Isolation::Worktree => {
            let branch = branch_name(session_id);
            let worktree = project_root
                .join(".monoco")
                .join("worktrees")
                .join(session_id.to_string());
            let worktree_arg = worktree.display().to_string();
            match git(
                project_root,
                &["worktree", "add", "-b", &branch, &worktree_arg],
            )
            .await
            {
                Ok(()) => {
                    debug!(path = %worktree.display(), "added worktree");
                    worktree
                },
                Err(e) => {
                    warn!(error = %e, "worktree add failed, using project root");
                    project_root.to_path_buf()
                },
            }
        },
    }
}

fn branch_name(session_id: &SessionId) -> String {
    let id = session_id.to_string();
    let short = id.get(..8).unwrap_or(&id);
    format!("monoco/session-{short}")
}

async fn git(root: &Path, args: &[&str]) -> std::io::Result<()> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .await?;
    if output.status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_root_isolation_is_identity() {
        let tmp = TempDir::new().unwrap();
        let workdir =
            prepare_workdir(tmp.path(), &SessionId::new(), Isolation::Root).await;
        assert_eq!(workdir, tmp.path());
    }

    #[tokio::test]
    async fn test_branch_isolation_degrades_outside_git() {
        // Not a git repository: checkout fails, falls back to the root.
        let tmp = TempDir::new().unwrap();
        let workdir =
            prepare_workdir(tmp.path(), &SessionId::new(), Isolation::Branch).await;
        assert_eq!(workdir, tmp.path());
    }

    #[tokio::test]
    async fn test_worktree_isolation_degrades_outside_git() {
        let tmp = TempDir::new().unwrap();
        let workdir =
            prepare_workdir(tmp.path(), &SessionId::new(), Isolation::Worktree).await;
        assert_eq!(workdir, tmp.path());
    }

    #[test]
    fn test_branch_name_is_short() {
        let id = SessionId::new();
        let name = branch_name(&id);
        assert!(name.starts_with("monoco/session-"));
        assert!(name.len() < 32);
    }
}
