//! Atomic filesystem helpers.
//!
//! All durable state in monoco is written with write-to-temp + rename so a
//! crash mid-write never leaves a truncated file behind. The temp file is
//! created in the destination's directory so the rename stays on one
//! filesystem.

use std::io::{self, Write};
use std::path::Path;

/// Atomically write `contents` to `path`.
///
/// # Errors
///
/// Returns an error if the parent directory does not exist, or if writing or
/// renaming the temporary file fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no parent directory: {}", path.display()),
        )
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");

        write_atomic(&path, b"{\"ok\":true}").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"ok\":true}");
    }

    #[test]
    fn test_write_atomic_replaces_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");

        write_atomic(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        write_atomic(&path, b"data").unwrap();

        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_atomic_missing_parent_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope").join("state.json");
        assert!(write_atomic(&path, b"data").is_err());
    }
}
