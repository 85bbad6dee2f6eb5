//! The storage model: authoritative record of users, limits and usage.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::auth::{FolderScope, Privilege, PrivilegeScope, PrivilegeSet, User, UserRegistry};

use super::quota::QuotaTracker;

/// Aggregate root of one storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageModel {
    /// Absolute storage root, fixed at creation.
    pub root_directory: PathBuf,
    /// Username of the storage creator.
    pub superuser: String,
    /// Username of the logged-in user, if any.
    pub current_user: Option<String>,
    /// Size and file count quotas.
    pub quota: QuotaTracker,
    /// Denied file suffixes, each with a leading dot and lower-cased.
    pub unsupported_extensions: Vec<String>,
    /// Storage-wide folder privileges keyed by absolute path.
    pub folder_privileges: BTreeMap<PathBuf, PrivilegeSet>,
    /// Registered users.
    pub users: UserRegistry,
}

impl StorageModel {
    /// Create the model of a fresh storage.
    ///
    /// The creator becomes the superuser, the only user, and is logged in
    /// with every privilege.
    pub fn fresh(root_directory: PathBuf, creator: User, current_storage_size: u64) -> Self {
        let creator = User {
            privileges: Privilege::all(),
            ..creator
        };
        let superuser = creator.username.clone();
        let users = UserRegistry::from_users([creator]);

        Self {
            root_directory,
            current_user: Some(superuser.clone()),
            superuser,
            quota: QuotaTracker::with_usage(current_storage_size),
            unsupported_extensions: Vec::new(),
            folder_privileges: BTreeMap::new(),
            users,
        }
    }

    /// The logged-in user.
    pub fn current_user(&self) -> Option<&User> {
        self.current_user
            .as_deref()
            .and_then(|name| self.users.find(name))
    }

    /// Folder-scope table for privilege checks.
    pub fn folder_scope(&self, scope: PrivilegeScope) -> FolderScope<'_> {
        FolderScope::new(&self.root_directory, &self.folder_privileges, scope)
    }

    /// Check whether `name` ends with a denied extension.
    pub fn is_denied_extension(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.unsupported_extensions
            .iter()
            .any(|ext| name.ends_with(ext.as_str()))
    }

    /// Add an extension to the denylist.
    ///
    /// Returns `false` if it was already present.
    pub fn deny_extension(&mut self, extension: &str) -> bool {
        let normalized = normalize_extension(extension);
        if normalized.len() <= 1 || self.unsupported_extensions.contains(&normalized) {
            return false;
        }
        self.unsupported_extensions.push(normalized);
        true
    }

    /// Re-anchor every path-keyed policy at or below `from` onto `to`.
    ///
    /// Covers storage-wide folder privileges, per-user overrides and
    /// file count ceilings.
    pub fn rebase_policies(&mut self, from: &Path, to: &Path) {
        rebase_keys(&mut self.folder_privileges, from, to);
        rebase_keys(&mut self.quota.max_files_per_directory, from, to);
        for user in self.users.iter_mut() {
            rebase_keys(&mut user.folder_privileges, from, to);
        }
    }

    /// Drop every path-keyed policy at or below `path`.
    pub fn forget_policies(&mut self, path: &Path) {
        self.folder_privileges.retain(|key, _| !key.starts_with(path));
        self.quota
            .max_files_per_directory
            .retain(|key, _| !key.starts_with(path));
        for user in self.users.iter_mut() {
            user.folder_privileges.retain(|key, _| !key.starts_with(path));
        }
    }

    /// Check whether `path` lies inside the storage root.
    pub fn contains_path(&self, path: &Path) -> bool {
        path.starts_with(&self.root_directory)
    }
}

fn rebase_keys<V>(map: &mut BTreeMap<PathBuf, V>, from: &Path, to: &Path) {
    let moved: Vec<PathBuf> = map
        .keys()
        .filter(|key| key.starts_with(from))
        .cloned()
        .collect();

    let mut rebased = Vec::with_capacity(moved.len());
    for key in moved {
        if let (Some(value), Ok(rest)) = (map.remove(&key), key.strip_prefix(from)) {
            let target = if rest.as_os_str().is_empty() {
                to.to_path_buf()
            } else {
                to.join(rest)
            };
            rebased.push((target, value));
        }
    }
    map.extend(rebased);
}

/// Normalize an extension to a lower-case suffix with a leading dot.
pub fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim().trim_start_matches('.');
    format!(".{}", trimmed.to_lowercase())
}
