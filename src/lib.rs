//! quotastore - access-controlled local storage with soft quotas.
//!
//! A storage root holds user content plus two records, `config.json` and
//! `users.json`. Every operation is checked against the logged-in user's
//! privileges and the storage quotas before it touches the filesystem.

pub mod auth;
pub mod config;
pub mod datetime;
pub mod error;
pub mod logging;
pub mod storage;

pub use auth::{
    check_privilege, expand_grant, has_exact, require_superuser, Credentials, PermissionError,
    Privilege, PrivilegeScope, PrivilegeSet, User, UserRegistry,
};
pub use config::Config;
pub use error::{Result, StorageError};
pub use storage::{
    ListMode, ListOptions, Listing, Storage, StorageHandle, StorageModel, StorageRegistry,
    StorageSettings,
};
