//! Registry of storage users.

use tracing::debug;

use super::user::{Credentials, User};
use crate::{Result, StorageError};

/// Ordered set of registered users, unique by case-insensitive username.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRegistry {
    users: Vec<User>,
}

impl UserRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from users read back from disk.
    ///
    /// Later duplicates of an already present username are dropped.
    pub fn from_users(users: impl IntoIterator<Item = User>) -> Self {
        let mut registry = Self::new();
        for user in users {
            if registry.contains(&user.username) {
                debug!(username = %user.username, "dropping duplicate user record");
                continue;
            }
            registry.users.push(user);
        }
        registry
    }

    /// Look up a user by username.
    pub fn find(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.is_named(username))
    }

    /// Look up a user by username for modification.
    pub fn find_mut(&mut self, username: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.is_named(username))
    }

    /// Check whether a username is registered.
    pub fn contains(&self, username: &str) -> bool {
        self.find(username).is_some()
    }

    /// Find the user matching both username and password.
    pub fn authenticate(&self, credentials: &Credentials) -> Option<&User> {
        self.users.iter().find(|u| u.matches(credentials))
    }

    /// Register a new user.
    pub fn add(&mut self, user: User) -> Result<()> {
        if self.contains(&user.username) {
            return Err(StorageError::UserAlreadyExists(user.username));
        }
        self.users.push(user);
        Ok(())
    }

    /// Remove a user by username, returning the removed entry.
    pub fn remove(&mut self, username: &str) -> Result<User> {
        let index = self
            .users
            .iter()
            .position(|u| u.is_named(username))
            .ok_or_else(|| StorageError::UserNotFound(username.to_string()))?;
        Ok(self.users.remove(index))
    }

    /// Iterate over registered users in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.iter()
    }

    /// Iterate over registered users for modification.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut User> {
        self.users.iter_mut()
    }

    /// Number of registered users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check whether no users are registered.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
