//! Privilege checks for storage operations.
//!
//! A check runs in two stages:
//! 1. The user's global privilege set must contain the required privilege.
//! 2. If a folder-scoped entry applies to the target, it must contain the
//!    required privilege as well. A per-user override takes precedence over
//!    a storage-wide entry registered for the same path.
//!
//! Checks never touch the filesystem.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

use super::privilege::{has_exact, Privilege, PrivilegeScope, PrivilegeSet};
use super::user::User;
use crate::StorageError;

/// Permission-related errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// Nobody is logged in.
    #[error("no user is logged in")]
    NotAuthenticated,

    /// The user's global privileges lack the required one.
    #[error("user {username} lacks {privilege}")]
    MissingPrivilege {
        /// User performing the operation.
        username: String,
        /// Privilege the operation needs.
        privilege: Privilege,
    },

    /// A folder-scoped entry denies the privilege.
    #[error("{privilege} is not permitted in {path}")]
    FolderDenied {
        /// Path the applicable entry is registered for.
        path: String,
        /// Privilege the operation needs.
        privilege: Privilege,
    },

    /// Administrative operation attempted by someone other than the superuser.
    #[error("only the superuser may do this, not {0}")]
    NotSuperuser(String),
}

impl From<PermissionError> for StorageError {
    fn from(e: PermissionError) -> Self {
        match e {
            PermissionError::NotAuthenticated => StorageError::NoActiveUser,
            other => StorageError::InsufficientPrivileges(other.to_string()),
        }
    }
}

/// Folder-scoped privilege entries of one storage.
#[derive(Debug, Clone, Copy)]
pub struct FolderScope<'a> {
    root: &'a Path,
    entries: &'a BTreeMap<PathBuf, PrivilegeSet>,
    scope: PrivilegeScope,
}

impl<'a> FolderScope<'a> {
    /// Create a scope table over storage-wide entries.
    pub fn new(
        root: &'a Path,
        entries: &'a BTreeMap<PathBuf, PrivilegeSet>,
        scope: PrivilegeScope,
    ) -> Self {
        Self {
            root,
            entries,
            scope,
        }
    }

    /// Find the entry that governs `target` for `user`.
    ///
    /// Returns the path the entry is registered for along with its set.
    pub fn resolve<'u>(
        &self,
        user: &'u User,
        target: &'u Path,
    ) -> Option<(&'u Path, &'u PrivilegeSet)>
    where
        'a: 'u,
    {
        let candidates: Box<dyn Iterator<Item = &'u Path> + 'u> = match self.scope {
            PrivilegeScope::Exact => Box::new(std::iter::once(target)),
            PrivilegeScope::Inherited => {
                let root = self.root;
                Box::new(target.ancestors().take_while(move |p| p.starts_with(root)))
            }
        };

        for candidate in candidates {
            if let Some(set) = user.folder_override(candidate) {
                return Some((candidate, set));
            }
            if let Some(set) = self.entries.get(candidate) {
                return Some((candidate, set));
            }
        }
        None
    }
}

/// Check that `user` may perform an operation needing `required` on `target`.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use std::path::Path;
/// use quotastore::auth::{check_privilege, FolderScope, PermissionError, Privilege, PrivilegeScope};
///
/// let entries = BTreeMap::new();
/// let scope = FolderScope::new(Path::new("/store"), &entries, PrivilegeScope::Exact);
/// assert!(matches!(
///     check_privilege(None, Privilege::View, Path::new("/store"), &scope),
///     Err(PermissionError::NotAuthenticated)
/// ));
/// ```
pub fn check_privilege(
    user: Option<&User>,
    required: Privilege,
    target: &Path,
    scope: &FolderScope<'_>,
) -> Result<(), PermissionError> {
    let user = user.ok_or(PermissionError::NotAuthenticated)?;

    if !has_exact(&user.privileges, required) {
        return Err(PermissionError::MissingPrivilege {
            username: user.username.clone(),
            privilege: required,
        });
    }

    if let Some((path, set)) = scope.resolve(user, target) {
        if !has_exact(set, required) {
            return Err(PermissionError::FolderDenied {
                path: path.display().to_string(),
                privilege: required,
            });
        }
    }

    Ok(())
}

/// Require that `user` is the storage superuser.
pub fn require_superuser(user: Option<&User>, superuser: &str) -> Result<(), PermissionError> {
    let user = user.ok_or(PermissionError::NotAuthenticated)?;
    if !user.is_named(superuser) {
        return Err(PermissionError::NotSuperuser(user.username.clone()));
    }
    Ok(())
}
