//! Storage size and per-directory file count quotas.
//!
//! Both checks are gates: they run before a mutation and never reserve
//! anything. Usage is adjusted only after the mutation has succeeded.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::layout;
use crate::{Result, StorageError};

/// Quota limits and running usage of one storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaTracker {
    /// Storage size ceiling in bytes, if any.
    pub storage_size_limit: Option<u64>,
    /// Bytes currently accounted to the storage.
    pub current_storage_size: u64,
    /// Entry ceilings keyed by absolute directory path.
    pub max_files_per_directory: BTreeMap<PathBuf, usize>,
}

impl QuotaTracker {
    /// Create a tracker with no limits and the given usage.
    pub fn with_usage(current_storage_size: u64) -> Self {
        Self {
            current_storage_size,
            ..Self::default()
        }
    }

    /// Fail if adding `added` bytes while freeing `released` would exceed the size limit.
    pub fn check_size(&self, added: u64, released: u64) -> Result<()> {
        let Some(limit) = self.storage_size_limit else {
            return Ok(());
        };
        let projected = self
            .current_storage_size
            .saturating_sub(released)
            .saturating_add(added);
        if projected > limit {
            return Err(StorageError::StorageSizeExceeded {
                current: self.current_storage_size,
                added: added.saturating_sub(released),
                limit,
            });
        }
        Ok(())
    }

    /// Account for a completed mutation.
    pub fn apply(&mut self, added: u64, released: u64) {
        self.current_storage_size = self
            .current_storage_size
            .saturating_sub(released)
            .saturating_add(added);
    }

    /// Account for a deleted file.
    pub fn release(&mut self, bytes: u64) {
        self.apply(0, bytes);
    }

    /// Ceiling registered for exactly `dir`.
    pub fn ceiling(&self, dir: &Path) -> Option<usize> {
        self.max_files_per_directory.get(dir).copied()
    }

    /// Fail if adding `added` entries to `dir` would exceed its ceiling.
    ///
    /// The current count is read from disk on every call.
    pub fn check_file_count(&self, root: &Path, dir: &Path, added: usize) -> Result<()> {
        let Some(limit) = self.ceiling(dir) else {
            return Ok(());
        };
        if added == 0 {
            return Ok(());
        }
        let current = count_entries(root, dir)?;
        debug!(dir = %dir.display(), current, added, limit, "checking file count ceiling");
        if current + added > limit {
            return Err(StorageError::FileLimitExceeded {
                dir: layout::display_relative(root, dir),
                current,
                added,
                limit,
            });
        }
        Ok(())
    }
}

/// Count the entries of `dir`, ignoring the persisted records at the root.
///
/// A missing directory counts as empty.
pub fn count_entries(root: &Path, dir: &Path) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut count = 0;
    for entry in entries {
        let entry = entry?;
        if !layout::is_record(root, &entry.path()) {
            count += 1;
        }
    }
    Ok(count)
}

/// Total size in bytes of all files at or below `path`.
///
/// Symlinks are not followed.
pub fn path_size(path: &Path) -> io::Result<u64> {
    let meta = fs::symlink_metadata(path)?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        total += path_size(&entry?.path())?;
    }
    Ok(total)
}

/// Total size of the user content of a storage, excluding the persisted records.
pub fn measure(root: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if layout::is_record(root, &path) {
            continue;
        }
        total += path_size(&path)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_check_size_without_limit() {
        let quota = QuotaTracker::with_usage(1_000);
        assert!(quota.check_size(u64::MAX, 0).is_ok());
    }

    #[test]
    fn test_check_size_with_limit() {
        let mut quota = QuotaTracker::with_usage(80);
        quota.storage_size_limit = Some(100);

        assert!(quota.check_size(20, 0).is_ok());
        assert!(matches!(
            quota.check_size(21, 0),
            Err(StorageError::StorageSizeExceeded { limit: 100, .. })
        ));
        // Overwriting 10 bytes frees room for them.
        assert!(quota.check_size(30, 10).is_ok());
    }

    #[test]
    fn test_apply_and_release() {
        let mut quota = QuotaTracker::with_usage(10);
        quota.apply(15, 5);
        assert_eq!(quota.current_storage_size, 20);
        quota.release(25);
        assert_eq!(quota.current_storage_size, 0);
    }

    #[test]
    fn test_count_entries_skips_records() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join(layout::CONFIG_FILE), "{}").unwrap();
        fs::write(root.join(layout::USERS_FILE), "[]").unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub").join(layout::USERS_FILE), "x").unwrap();

        assert_eq!(count_entries(root, root).unwrap(), 2);
        assert_eq!(count_entries(root, &root.join("sub")).unwrap(), 1);
        assert_eq!(count_entries(root, &root.join("missing")).unwrap(), 0);
    }

    #[test]
    fn test_check_file_count() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let dir = root.join("docs");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("one"), "").unwrap();

        let mut quota = QuotaTracker::default();
        assert!(quota.check_file_count(root, &dir, 100).is_ok());

        quota.max_files_per_directory.insert(dir.clone(), 2);
        assert!(quota.check_file_count(root, &dir, 1).is_ok());
        assert!(matches!(
            quota.check_file_count(root, &dir, 2),
            Err(StorageError::FileLimitExceeded {
                current: 1,
                added: 2,
                limit: 2,
                ..
            })
        ));
        assert!(quota.check_file_count(root, &dir, 0).is_ok());
    }

    #[test]
    fn test_measure_excludes_records() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join(layout::CONFIG_FILE), "{\"big\": true}").unwrap();
        fs::write(root.join("a.bin"), [0u8; 10]).unwrap();
        fs::create_dir_all(root.join("x/y")).unwrap();
        fs::write(root.join("x/y/b.bin"), [0u8; 5]).unwrap();

        assert_eq!(measure(root).unwrap(), 15);
        assert_eq!(path_size(&root.join("x")).unwrap(), 5);
    }
}
