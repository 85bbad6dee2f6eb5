//! Persisted records of a storage: `config.json` and `users.json`.
//!
//! Both records are rewritten in full after every mutating call. Maps are
//! ordered so the same model always serializes to the same bytes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::layout::{CONFIG_FILE, USERS_FILE};
use super::model::StorageModel;
use super::quota::QuotaTracker;
use crate::auth::{PrivilegeSet, User, UserRegistry};
use crate::Result;

/// Serialized storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecord {
    /// Absolute storage root at the time of writing.
    pub root_directory: String,
    /// Username of the superuser.
    pub superuser: String,
    /// Username of the logged-in user.
    #[serde(default)]
    pub current_user: Option<String>,
    /// Storage size ceiling in bytes, meaningful only when `storage_size_limit_set`.
    #[serde(default)]
    pub storage_size_limit: u64,
    /// Whether a storage size ceiling is configured.
    #[serde(default)]
    pub storage_size_limit_set: bool,
    /// Bytes in use.
    #[serde(default)]
    pub current_storage_size: u64,
    /// Denied extensions.
    #[serde(default)]
    pub unsupported_extensions: Vec<String>,
    /// Entry ceilings keyed by absolute directory path.
    #[serde(default)]
    pub max_files_per_directory: BTreeMap<String, usize>,
    /// Storage-wide folder privileges keyed by absolute path.
    #[serde(default)]
    pub folder_privileges: BTreeMap<String, PrivilegeSet>,
}

/// Serialized user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Login username.
    pub username: String,
    /// Password.
    pub password: String,
    /// Global privileges.
    #[serde(default)]
    pub privileges: PrivilegeSet,
    /// Folder-scoped overrides keyed by absolute path.
    #[serde(default)]
    pub folder_privileges: BTreeMap<String, PrivilegeSet>,
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn keys_to_strings<V: Clone>(map: &BTreeMap<PathBuf, V>) -> BTreeMap<String, V> {
    map.iter().map(|(k, v)| (path_key(k), v.clone())).collect()
}

/// Re-anchor keys written under `old_root` to `new_root`.
///
/// Keys outside the old root cannot be placed and are dropped.
fn rebase_keys<V>(
    map: BTreeMap<String, V>,
    old_root: &Path,
    new_root: &Path,
) -> BTreeMap<PathBuf, V> {
    map.into_iter()
        .filter_map(|(key, value)| match Path::new(&key).strip_prefix(old_root) {
            Ok(rel) => Some((new_root.join(rel), value)),
            Err(_) => {
                warn!(key = %key, "dropping record entry outside the storage root");
                None
            }
        })
        .collect()
}

impl ConfigRecord {
    /// Capture the configuration part of a model.
    pub fn from_model(model: &StorageModel) -> Self {
        Self {
            root_directory: path_key(&model.root_directory),
            superuser: model.superuser.clone(),
            current_user: model.current_user.clone(),
            storage_size_limit: model.quota.storage_size_limit.unwrap_or(0),
            storage_size_limit_set: model.quota.storage_size_limit.is_some(),
            current_storage_size: model.quota.current_storage_size,
            unsupported_extensions: model.unsupported_extensions.clone(),
            max_files_per_directory: keys_to_strings(&model.quota.max_files_per_directory),
            folder_privileges: keys_to_strings(&model.folder_privileges),
        }
    }
}

impl UserRecord {
    /// Capture a user.
    pub fn from_user(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            password: user.password.clone(),
            privileges: user.privileges.clone(),
            folder_privileges: keys_to_strings(&user.folder_privileges),
        }
    }

    fn into_user(self, old_root: &Path, new_root: &Path) -> User {
        User {
            username: self.username,
            password: self.password,
            privileges: self.privileges,
            folder_privileges: rebase_keys(self.folder_privileges, old_root, new_root),
        }
    }
}

/// Rebuild a model from its two records.
///
/// `root` is authoritative: path keys written under a different root are
/// re-anchored to it, so a storage directory can be relocated.
pub fn into_model(root: &Path, config: ConfigRecord, users: Vec<UserRecord>) -> StorageModel {
    let old_root = PathBuf::from(&config.root_directory);
    let users = UserRegistry::from_users(users.into_iter().map(|u| u.into_user(&old_root, root)));

    StorageModel {
        root_directory: root.to_path_buf(),
        superuser: config.superuser,
        current_user: config.current_user,
        quota: QuotaTracker {
            storage_size_limit: config
                .storage_size_limit_set
                .then_some(config.storage_size_limit),
            current_storage_size: config.current_storage_size,
            max_files_per_directory: rebase_keys(config.max_files_per_directory, &old_root, root),
        },
        unsupported_extensions: config.unsupported_extensions,
        folder_privileges: rebase_keys(config.folder_privileges, &old_root, root),
        users,
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    fs::write(&temp, content)?;
    fs::rename(&temp, path)?;
    Ok(())
}

/// Write both records of `model` into its root directory.
pub fn save(model: &StorageModel) -> Result<()> {
    let root = &model.root_directory;
    let config = serde_json::to_string_pretty(&ConfigRecord::from_model(model))?;
    let users: Vec<UserRecord> = model.users.iter().map(UserRecord::from_user).collect();
    let users = serde_json::to_string_pretty(&users)?;

    write_atomic(&root.join(USERS_FILE), &users)?;
    write_atomic(&root.join(CONFIG_FILE), &config)?;

    debug!(root = %root.display(), "storage records written");
    Ok(())
}

/// Read the model persisted in `root`.
pub fn load(root: &Path) -> Result<StorageModel> {
    let config: ConfigRecord = serde_json::from_str(&fs::read_to_string(root.join(CONFIG_FILE))?)?;
    let users: Vec<UserRecord> = serde_json::from_str(&fs::read_to_string(root.join(USERS_FILE))?)?;
    Ok(into_model(root, config, users))
}
