//! Storage engine: opening, sessions and administration.
//!
//! File operations live in `operations.rs`; both extend [`Storage`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use tracing::{debug, info, warn};

use super::layout::{self, DOWNLOAD_DIR};
use super::model::{normalize_extension, StorageModel};
use super::quota;
use super::records;
use crate::auth::{
    check_privilege, expand_grant, require_superuser, Credentials, Privilege, PrivilegeScope,
    PrivilegeSet, User, UserRegistry,
};
use crate::config::StorageConfig;
use crate::datetime::parse_timezone;
use crate::{Result, StorageError};

/// Runtime settings shared by every storage of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageSettings {
    /// How folder-scoped privileges are looked up.
    pub privilege_scope: PrivilegeScope,
    /// Timezone used to render modification times.
    pub timezone: Tz,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            privilege_scope: PrivilegeScope::default(),
            timezone: Tz::UTC,
        }
    }
}

impl StorageSettings {
    /// Build settings from the `[storage]` configuration section.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let timezone = parse_timezone(&config.timezone)
            .ok_or_else(|| StorageError::Config(format!("unknown timezone: {}", config.timezone)))?;
        Ok(Self {
            privilege_scope: config.privilege_scope,
            timezone,
        })
    }
}

/// One open storage.
#[derive(Debug)]
pub struct Storage {
    pub(super) model: StorageModel,
    pub(super) settings: StorageSettings,
}

impl Storage {
    /// Open the storage at `root`, creating it if it is not initialized yet.
    ///
    /// On creation the caller becomes the superuser and is logged in. On
    /// re-open the caller is logged in if the credentials match a registered
    /// user; otherwise the storage is returned without a session together
    /// with the session error.
    pub fn open_or_create(
        root: impl AsRef<Path>,
        credentials: &Credentials,
        settings: StorageSettings,
    ) -> Result<(Self, Option<StorageError>)> {
        let root = root.as_ref();
        if root.exists() && !root.is_dir() {
            return Err(StorageError::InvalidPath(root.display().to_string()));
        }

        if layout::is_storage_root(root) {
            Self::reopen(root, credentials, settings)
        } else {
            Self::create(root, credentials, settings).map(|storage| (storage, None))
        }
    }

    fn create(root: &Path, credentials: &Credentials, settings: StorageSettings) -> Result<Self> {
        credentials.validate()?;
        fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        fs::create_dir_all(root.join(DOWNLOAD_DIR))?;

        let existing = quota::measure(&root)?;
        let creator = User::new(&credentials.username, &credentials.password);
        let model = StorageModel::fresh(root, creator, existing);
        records::save(&model)?;

        info!(
            root = %model.root_directory.display(),
            superuser = %model.superuser,
            existing_bytes = existing,
            "storage created"
        );
        Ok(Self { model, settings })
    }

    fn reopen(
        root: &Path,
        credentials: &Credentials,
        settings: StorageSettings,
    ) -> Result<(Self, Option<StorageError>)> {
        let root = root.canonicalize()?;
        let mut model = records::load(&root)?;
        fs::create_dir_all(root.join(DOWNLOAD_DIR))?;

        let session_error = match model.users.authenticate(credentials) {
            Some(user) => {
                model.current_user = Some(user.username.clone());
                None
            }
            None => {
                warn!(username = %credentials.username, "credentials rejected on open");
                model.current_user = None;
                Some(StorageError::UserNotFound(credentials.username.clone()))
            }
        };
        records::save(&model)?;

        info!(
            root = %root.display(),
            user = ?model.current_user,
            "storage opened"
        );
        Ok((Self { model, settings }, session_error))
    }

    /// Absolute storage root.
    pub fn root(&self) -> &Path {
        &self.model.root_directory
    }

    /// The storage model.
    pub fn model(&self) -> &StorageModel {
        &self.model
    }

    /// Runtime settings.
    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    /// The logged-in user.
    pub fn current_user(&self) -> Option<&User> {
        self.model.current_user()
    }

    /// Registered users.
    pub fn users(&self) -> &UserRegistry {
        &self.model.users
    }

    /// Username of the superuser.
    pub fn superuser(&self) -> &str {
        &self.model.superuser
    }

    /// Storage size ceiling in bytes.
    pub fn storage_size_limit(&self) -> Option<u64> {
        self.model.quota.storage_size_limit
    }

    /// Bytes currently accounted to the storage.
    pub fn current_storage_size(&self) -> u64 {
        self.model.quota.current_storage_size
    }

    /// Denied extensions.
    pub fn unsupported_extensions(&self) -> &[String] {
        &self.model.unsupported_extensions
    }

    /// Write the records to disk.
    pub fn flush(&self) -> Result<()> {
        records::save(&self.model)
    }

    pub(super) fn persist(&self) -> Result<()> {
        self.flush()
    }

    pub(super) fn resolve(&self, relative: &str) -> Result<PathBuf> {
        layout::resolve(&self.model.root_directory, relative)
    }

    pub(super) fn relative(&self, path: &Path) -> String {
        layout::display_relative(&self.model.root_directory, path)
    }

    pub(super) fn authorize(&self, privilege: Privilege, target: &Path) -> Result<()> {
        let scope = self.model.folder_scope(self.settings.privilege_scope);
        check_privilege(self.model.current_user(), privilege, target, &scope).map_err(|e| {
            warn!(
                privilege = %privilege,
                target = %self.relative(target),
                error = %e,
                "operation denied"
            );
            StorageError::from(e)
        })
    }

    fn authorize_admin(&self) -> Result<()> {
        require_superuser(self.model.current_user(), &self.model.superuser).map_err(|e| {
            warn!(error = %e, "administrative operation denied");
            StorageError::from(e)
        })
    }

    // Session

    /// Log in a registered user.
    pub fn login(&mut self, credentials: &Credentials) -> Result<()> {
        let username = self
            .model
            .users
            .authenticate(credentials)
            .map(|user| user.username.clone())
            .ok_or_else(|| StorageError::UserNotFound(credentials.username.clone()))?;

        if let Some(active) = &self.model.current_user {
            return Err(StorageError::UserAlreadyLoggedIn(active.clone()));
        }

        self.model.current_user = Some(username.clone());
        self.persist()?;
        info!(username = %username, "user logged in");
        Ok(())
    }

    /// Log out the active user.
    pub fn logout(&mut self, username: &str) -> Result<()> {
        if !self.model.users.contains(username) {
            return Err(StorageError::UserNotFound(username.to_string()));
        }
        match self.model.current_user() {
            Some(active) if active.is_named(username) => {}
            _ => return Err(StorageError::UserLogoutMismatch(username.to_string())),
        }

        self.model.current_user = None;
        self.persist()?;
        info!(username = %username, "user logged out");
        Ok(())
    }

    /// Attach a caller to an already open storage.
    ///
    /// Logs the caller in when nobody is. Returns the session error when
    /// the credentials do not match or another user holds the session.
    pub(super) fn resume_session(&mut self, credentials: &Credentials) -> Result<Option<StorageError>> {
        let Some(user) = self.model.users.authenticate(credentials) else {
            return Ok(Some(StorageError::UserNotFound(credentials.username.clone())));
        };
        let username = user.username.clone();

        let active = self
            .model
            .current_user()
            .map(|active| (active.is_named(&username), active.username.clone()));

        match active {
            None => {
                self.model.current_user = Some(username);
                self.persist()?;
                debug!("session resumed on open storage");
                Ok(None)
            }
            Some((true, _)) => Ok(None),
            Some((false, other)) => Ok(Some(StorageError::UserAlreadyLoggedIn(other))),
        }
    }

    // Administration

    /// Register a new user with the given global privileges.
    pub fn add_new_user(
        &mut self,
        credentials: &Credentials,
        privileges: impl IntoIterator<Item = Privilege>,
    ) -> Result<()> {
        self.authorize_admin()?;
        credentials.validate()?;
        let user = User::new(&credentials.username, &credentials.password).with_privileges(privileges);
        let summary = format!("{:?}", user.privileges);
        self.model.users.add(user)?;
        self.persist()?;
        info!(username = %credentials.username, privileges = %summary, "user added");
        Ok(())
    }

    /// Remove a registered user.
    ///
    /// The superuser cannot be removed.
    pub fn remove_user(&mut self, username: &str) -> Result<()> {
        self.authorize_admin()?;
        if self
            .model
            .users
            .find(username)
            .is_some_and(|user| user.is_named(&self.model.superuser))
        {
            return Err(StorageError::InsufficientPrivileges(
                "the superuser cannot be removed".to_string(),
            ));
        }

        let removed = self.model.users.remove(username)?;
        self.persist()?;
        info!(username = %removed.username, "user removed");
        Ok(())
    }

    /// Cap the number of entries directly inside `path`.
    pub fn limit_number_of_files(&mut self, limit: usize, path: &str) -> Result<()> {
        self.authorize_admin()?;
        let dir = self.resolve(path)?;
        if !dir.is_dir() {
            return Err(StorageError::FileNotFound(path.to_string()));
        }

        self.model.quota.max_files_per_directory.insert(dir, limit);
        self.persist()?;
        info!(dir = %path, limit, "file count ceiling set");
        Ok(())
    }

    /// Cap the total size of the storage in bytes.
    pub fn limit_storage_size(&mut self, bytes: u64) -> Result<()> {
        self.authorize_admin()?;
        self.model.quota.storage_size_limit = Some(bytes);
        self.persist()?;
        info!(
            limit = bytes,
            current = self.model.quota.current_storage_size,
            "storage size ceiling set"
        );
        Ok(())
    }

    /// Deny files with the given extension.
    pub fn restrict_extension(&mut self, extension: &str) -> Result<()> {
        self.authorize_admin()?;
        if normalize_extension(extension).len() <= 1 {
            return Err(StorageError::InvalidExtension(extension.to_string()));
        }

        if self.model.deny_extension(extension) {
            self.persist()?;
            info!(extension = %normalize_extension(extension), "extension denied");
        } else {
            debug!(extension = %extension, "extension already denied");
        }
        Ok(())
    }

    /// Attach a storage-wide privilege requirement to `path`.
    ///
    /// The grant is expanded cumulatively, so granting CREATE also
    /// permits DOWNLOAD and VIEW.
    pub fn set_folder_privileges(&mut self, path: &str, privileges: &PrivilegeSet) -> Result<()> {
        self.authorize_admin()?;
        let target = self.existing(path)?;
        let granted = expand_grant(privileges);
        info!(path = %path, granted = ?granted, "folder privileges set");
        self.model.folder_privileges.insert(target, granted);
        self.persist()
    }

    /// Attach a per-user privilege override to `path`.
    pub fn set_user_folder_privileges(
        &mut self,
        username: &str,
        path: &str,
        privileges: &PrivilegeSet,
    ) -> Result<()> {
        self.authorize_admin()?;
        let target = self.existing(path)?;
        let granted = expand_grant(privileges);
        let user = self
            .model
            .users
            .find_mut(username)
            .ok_or_else(|| StorageError::UserNotFound(username.to_string()))?;
        info!(username = %user.username, path = %path, granted = ?granted, "user folder privileges set");
        user.folder_privileges.insert(target, granted);
        self.persist()
    }

    /// Re-derive the usage counter from the files on disk.
    ///
    /// Returns the new usage in bytes.
    pub fn recompute_usage(&mut self) -> Result<u64> {
        self.authorize_admin()?;
        let measured = quota::measure(&self.model.root_directory)?;
        let previous = self.model.quota.current_storage_size;
        self.model.quota.current_storage_size = measured;
        self.persist()?;
        if measured != previous {
            warn!(previous, measured, "usage counter reconciled");
        }
        Ok(measured)
    }

    fn existing(&self, path: &str) -> Result<PathBuf> {
        let target = self.resolve(path)?;
        match fs::symlink_metadata(&target) {
            Ok(_) => Ok(target),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::FileNotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
