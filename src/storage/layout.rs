//! Reserved storage layout and path resolution.
//!
//! ```text
//! {root}/
//! ├── config.json   storage configuration record
//! ├── users.json    registered users
//! ├── Download/     export target of `get`
//! └── ...           user content
//! ```

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::{Result, StorageError};

/// Storage configuration record file name.
pub const CONFIG_FILE: &str = "config.json";

/// User record file name.
pub const USERS_FILE: &str = "users.json";

/// Reserved download folder name.
pub const DOWNLOAD_DIR: &str = "Download";

/// Check whether `dir` is already an initialized storage root.
pub fn is_storage_root(dir: &Path) -> bool {
    dir.join(USERS_FILE).is_file() || dir.join(CONFIG_FILE).is_file()
}

/// Make `path` absolute, resolving symlinks when it already exists.
pub fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.exists() {
        path.canonicalize()
    } else {
        std::path::absolute(path)
    }
}

/// Resolve a root-relative path.
///
/// A leading separator is ignored so `/docs` and `docs` are equivalent.
/// Parent components are rejected so the result never escapes `root`.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf> {
    let trimmed = relative.trim_start_matches(['/', '\\']);
    let mut resolved = root.to_path_buf();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return Err(StorageError::InvalidPath(relative.to_string())),
        }
    }
    Ok(resolved)
}

/// Validate a single file or folder name.
pub fn validate_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StorageError::InvalidPath(name.to_string())),
    }
}

/// Render `path` relative to `root` with `/` separators.
///
/// The root itself renders as `/`.
pub fn display_relative(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => "/".to_string(),
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.display().to_string(),
    }
}

/// Check whether `path` is one of the two persisted records.
pub fn is_record(root: &Path, path: &Path) -> bool {
    path.parent() == Some(root)
        && path
            .file_name()
            .is_some_and(|name| name == CONFIG_FILE || name == USERS_FILE)
}

/// Check whether `path` is a reserved artifact that operations must not remove or replace.
pub fn is_reserved(root: &Path, path: &Path) -> bool {
    path == root || path == root.join(DOWNLOAD_DIR) || is_record(root, path)
}
