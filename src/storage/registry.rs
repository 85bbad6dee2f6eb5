//! Process-wide registry of open storages.
//!
//! Each storage is wrapped in a mutex so one logical operation, including
//! its quota checks and the record rewrite, runs without interleaving.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{error, info};

use super::engine::{Storage, StorageSettings};
use super::layout;
use crate::auth::Credentials;
use crate::{Result, StorageError};

/// Shared, lockable storage.
pub type SharedStorage = Arc<Mutex<Storage>>;

/// Handle to an open storage.
#[derive(Debug, Clone)]
pub struct StorageHandle {
    root: PathBuf,
    storage: SharedStorage,
}

impl StorageHandle {
    fn new(storage: Storage) -> Self {
        Self {
            root: storage.root().to_path_buf(),
            storage: Arc::new(Mutex::new(storage)),
        }
    }

    /// Absolute storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `f` with exclusive access to the storage.
    pub fn with<R>(&self, f: impl FnOnce(&mut Storage) -> Result<R>) -> Result<R> {
        let mut storage = self
            .storage
            .lock()
            .map_err(|_| StorageError::LockPoisoned(self.root.display().to_string()))?;
        f(&mut *storage)
    }
}

/// Registry of open storages keyed by absolute root.
#[derive(Debug)]
pub struct StorageRegistry {
    settings: StorageSettings,
    storages: RwLock<BTreeMap<PathBuf, StorageHandle>>,
}

impl StorageRegistry {
    /// Create an empty registry.
    pub fn init(settings: StorageSettings) -> Self {
        info!(
            privilege_scope = ?settings.privilege_scope,
            timezone = %settings.timezone,
            "storage registry initialized"
        );
        Self {
            settings,
            storages: RwLock::new(BTreeMap::new()),
        }
    }

    fn poisoned() -> StorageError {
        StorageError::LockPoisoned("storage registry".to_string())
    }

    /// Open or create the storage at `root`.
    ///
    /// A storage that is already open is shared: the caller is logged in if
    /// nobody is, and the session error is returned if the credentials do
    /// not match or another user holds the session.
    pub fn open(
        &self,
        root: impl AsRef<Path>,
        credentials: &Credentials,
    ) -> Result<(StorageHandle, Option<StorageError>)> {
        let key = layout::absolute(root.as_ref())?;

        if let Some(handle) = self.get(&key)? {
            let session = handle.with(|storage| storage.resume_session(credentials))?;
            return Ok((handle, session));
        }

        let mut storages = self.storages.write().map_err(|_| Self::poisoned())?;

        // Another caller may have opened it while we waited for the write lock.
        if let Some(handle) = storages.get(&key).cloned() {
            drop(storages);
            let session = handle.with(|storage| storage.resume_session(credentials))?;
            return Ok((handle, session));
        }

        let (storage, session) = Storage::open_or_create(&key, credentials, self.settings)?;
        let handle = StorageHandle::new(storage);
        storages.insert(handle.root().to_path_buf(), handle.clone());
        if handle.root() != key.as_path() {
            storages.insert(key, handle.clone());
        }
        Ok((handle, session))
    }

    /// Handle of an already open storage.
    pub fn get(&self, root: impl AsRef<Path>) -> Result<Option<StorageHandle>> {
        let key = layout::absolute(root.as_ref())?;
        let storages = self.storages.read().map_err(|_| Self::poisoned())?;
        Ok(storages.get(&key).cloned())
    }

    /// Roots of all open storages.
    pub fn roots(&self) -> Result<Vec<PathBuf>> {
        let storages = self.storages.read().map_err(|_| Self::poisoned())?;
        Ok(storages
            .iter()
            .filter(|(key, handle)| key.as_path() == handle.root())
            .map(|(key, _)| key.clone())
            .collect())
    }

    /// Flush every open storage and empty the registry.
    ///
    /// All storages are flushed even if one fails; the first error is returned.
    pub fn shutdown(&self) -> Result<()> {
        let storages = {
            let mut storages = self.storages.write().map_err(|_| Self::poisoned())?;
            std::mem::take(&mut *storages)
        };

        let mut first_error = None;
        for (key, handle) in storages {
            if key.as_path() != handle.root() {
                continue;
            }
            if let Err(e) = handle.with(|storage| storage.flush()) {
                error!(root = %key.display(), error = %e, "failed to flush storage");
                first_error.get_or_insert(e);
            }
        }

        info!("storage registry shut down");
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Privilege;
    use tempfile::TempDir;

    fn admin() -> Credentials {
        Credentials::new("admin", "secret")
    }

    #[test]
    fn test_open_registers_storage() {
        let temp_dir = TempDir::new().unwrap();
        let registry = StorageRegistry::init(StorageSettings::default());

        let (handle, session) = registry.open(temp_dir.path().join("s"), &admin()).unwrap();
        assert!(session.is_none());
        assert_eq!(registry.roots().unwrap(), vec![handle.root().to_path_buf()]);
        assert!(registry.get(handle.root()).unwrap().is_some());
        assert!(registry.get(temp_dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_open_twice_shares_storage() {
        let temp_dir = TempDir::new().unwrap();
        let registry = StorageRegistry::init(StorageSettings::default());
        let root = temp_dir.path().join("s");

        let (first, _) = registry.open(&root, &admin()).unwrap();
        first
            .with(|s| s.add_new_user(&Credentials::new("bob", "pw"), [Privilege::View]))
            .unwrap();

        let (second, session) = registry.open(&root, &admin()).unwrap();
        assert!(session.is_none());
        assert_eq!(second.with(|s| Ok(s.users().len())).unwrap(), 2);

        let (_, session) = registry.open(&root, &Credentials::new("bob", "pw")).unwrap();
        assert!(matches!(session, Some(StorageError::UserAlreadyLoggedIn(_))));

        let (_, session) = registry.open(&root, &Credentials::new("bob", "bad")).unwrap();
        assert!(matches!(session, Some(StorageError::UserNotFound(_))));
    }

    #[test]
    fn test_open_resumes_empty_session() {
        let temp_dir = TempDir::new().unwrap();
        let registry = StorageRegistry::init(StorageSettings::default());
        let root = temp_dir.path().join("s");

        let (handle, _) = registry.open(&root, &admin()).unwrap();
        handle.with(|s| s.logout("admin")).unwrap();

        let (_, session) = registry.open(&root, &admin()).unwrap();
        assert!(session.is_none());
        assert_eq!(
            handle
                .with(|s| Ok(s.current_user().map(|u| u.username.clone())))
                .unwrap(),
            Some("admin".to_string())
        );
    }

    #[test]
    fn test_shutdown_flushes_and_clears() {
        let temp_dir = TempDir::new().unwrap();
        let registry = StorageRegistry::init(StorageSettings::default());
        let (handle, _) = registry.open(temp_dir.path().join("s"), &admin()).unwrap();
        let config = handle.root().join(layout::CONFIG_FILE);
        std::fs::remove_file(&config).unwrap();

        registry.shutdown().unwrap();
        assert!(config.is_file());
        assert!(registry.roots().unwrap().is_empty());
    }
}
