//! User model.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::privilege::{Privilege, PrivilegeSet};
use crate::{Result, StorageError};

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Username and password pair supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login username.
    pub username: String,
    /// Plain password.
    pub password: String,
}

impl Credentials {
    /// Create a new credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Reject a blank username or password.
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(StorageError::InvalidCredentials("username is empty".to_string()));
        }
        if self.password.is_empty() {
            return Err(StorageError::InvalidCredentials(format!(
                "password for {} is empty",
                self.username
            )));
        }
        Ok(())
    }
}

/// A registered storage user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Login username, unique ignoring case.
    pub username: String,
    /// Password, compared ignoring case.
    pub password: String,
    /// Global privileges.
    pub privileges: PrivilegeSet,
    /// Folder-scoped overrides keyed by absolute path.
    pub folder_privileges: BTreeMap<PathBuf, PrivilegeSet>,
}

impl User {
    /// Create a user without any privileges.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            privileges: PrivilegeSet::new(),
            folder_privileges: BTreeMap::new(),
        }
    }

    /// Set the global privileges.
    pub fn with_privileges(mut self, privileges: impl IntoIterator<Item = Privilege>) -> Self {
        self.privileges = privileges.into_iter().collect();
        self
    }

    /// Check whether this user is identified by `username`.
    pub fn is_named(&self, username: &str) -> bool {
        eq_ignore_case(&self.username, username)
    }

    /// Check the supplied credentials against this user.
    ///
    /// Both username and password compare case-insensitively.
    pub fn matches(&self, credentials: &Credentials) -> bool {
        self.is_named(&credentials.username)
            && eq_ignore_case(&self.password, &credentials.password)
    }

    /// Folder-scoped override registered for exactly `path`.
    pub fn folder_override(&self, path: &Path) -> Option<&PrivilegeSet> {
        self.folder_privileges.get(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_validate() {
        assert!(Credentials::new("admin", "secret").validate().is_ok());
        assert!(matches!(
            Credentials::new("admin", "").validate(),
            Err(StorageError::InvalidCredentials(_))
        ));
        assert!(matches!(
            Credentials::new("  ", "secret").validate(),
            Err(StorageError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn test_matches_ignores_case() {
        let user = User::new("Alice", "Secret");
        assert!(user.matches(&Credentials::new("alice", "SECRET")));
        assert!(!user.matches(&Credentials::new("alice", "other")));
        assert!(!user.matches(&Credentials::new("bob", "secret")));
    }

    #[test]
    fn test_with_privileges() {
        let user = User::new("bob", "pw").with_privileges([Privilege::View, Privilege::Create]);
        assert_eq!(user.privileges.len(), 2);
        assert!(user.privileges.contains(&Privilege::Create));
    }

    #[test]
    fn test_folder_override_exact_key() {
        let mut user = User::new("bob", "pw");
        user.folder_privileges
            .insert(PathBuf::from("/s/secret"), [Privilege::View].into_iter().collect());

        assert!(user.folder_override(Path::new("/s/secret")).is_some());
        assert!(user.folder_override(Path::new("/s/secret/inner")).is_none());
    }
}
