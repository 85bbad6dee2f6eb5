//! Test helpers for storage integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use quotastore::{Credentials, Privilege, Storage, StorageError, StorageSettings};

/// Superuser name used by every fixture.
pub const ADMIN: &str = "admin";

/// Superuser password used by every fixture.
pub const ADMIN_PASSWORD: &str = "secret";

/// Credentials of the fixture superuser.
pub fn admin() -> Credentials {
    Credentials::new(ADMIN, ADMIN_PASSWORD)
}

/// A fresh storage in a temporary directory, plus a scratch directory for import sources.
pub struct TestStorage {
    pub temp_dir: TempDir,
    pub storage: Storage,
}

impl TestStorage {
    /// Create a storage logged in as the superuser.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("outside")).unwrap();
        let (storage, session) = Storage::open_or_create(
            temp_dir.path().join("store"),
            &admin(),
            StorageSettings::default(),
        )
        .unwrap();
        assert!(session.is_none());
        Self { temp_dir, storage }
    }

    /// Directory outside the storage root for `put` sources.
    pub fn outside(&self) -> PathBuf {
        self.temp_dir.path().join("outside")
    }

    /// Write a file of `size` bytes outside the storage.
    pub fn source_file(&self, name: &str, size: usize) -> PathBuf {
        let path = self.outside().join(name);
        fs::write(&path, vec![b'x'; size]).unwrap();
        path
    }

    /// Register a user and switch the session to them.
    pub fn login_as(&mut self, username: &str, privileges: &[Privilege]) {
        let credentials = Credentials::new(username, "pw");
        if !self.storage.users().contains(username) {
            let active = self.storage.current_user().map(|u| u.username.clone());
            if active.as_deref() != Some(ADMIN) {
                self.switch(&admin());
            }
            self.storage
                .add_new_user(&credentials, privileges.iter().copied())
                .unwrap();
        }
        self.switch(&credentials);
    }

    /// Log out whoever is active and log in with `credentials`.
    pub fn switch(&mut self, credentials: &Credentials) {
        if let Some(active) = self.storage.current_user().map(|u| u.username.clone()) {
            self.storage.logout(&active).unwrap();
        }
        self.storage.login(credentials).unwrap();
    }
}

/// Sum of file sizes under `root`, excluding the persisted records.
pub fn disk_usage(root: &Path) -> u64 {
    quotastore::storage::quota::measure(root).unwrap()
}

/// Number of entries directly inside `dir`.
pub fn entry_count(root: &Path, dir: &Path) -> usize {
    quotastore::storage::quota::count_entries(root, dir).unwrap()
}

/// Whether `result` failed with insufficient privileges.
pub fn is_denied<T>(result: &Result<T, StorageError>) -> bool {
    matches!(result, Err(StorageError::InsufficientPrivileges(_)))
}
