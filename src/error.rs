//! Error types for quotastore.

use thiserror::Error;

/// Common error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The current user lacks a privilege required by the operation.
    #[error("insufficient privileges: {0}")]
    InsufficientPrivileges(String),

    /// No user is logged in to the storage.
    #[error("no active user session")]
    NoActiveUser,

    /// Path does not exist.
    #[error("{0} not found")]
    FileNotFound(String),

    /// File extension is on the storage denylist.
    #[error("extension not allowed: {0}")]
    InvalidExtension(String),

    /// Directory entry ceiling would be exceeded.
    #[error("file limit exceeded for {dir}: {current} + {added} > {limit}")]
    FileLimitExceeded {
        /// Directory the ceiling is registered for.
        dir: String,
        /// Entries present at check time.
        current: usize,
        /// Entries the operation would introduce.
        added: usize,
        /// Registered ceiling.
        limit: usize,
    },

    /// Storage size ceiling would be exceeded.
    #[error("storage size exceeded: {current} + {added} > {limit} bytes")]
    StorageSizeExceeded {
        /// Bytes used at check time.
        current: u64,
        /// Bytes the operation would add.
        added: u64,
        /// Registered ceiling.
        limit: u64,
    },

    /// Source passed to an import already lives inside the storage root.
    #[error("already in storage: {0}")]
    FileAlreadyInStorage(String),

    /// Underlying delete call failed.
    #[error("failed to delete {path}: {source}")]
    FileDeleteFailed {
        /// Path that could not be removed.
        path: String,
        /// Error reported by the filesystem.
        source: std::io::Error,
    },

    /// The filesystem declined a mutation without reporting an I/O error.
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// Username or password is empty.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// User is not registered.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Username is already registered.
    #[error("user already exists: {0}")]
    UserAlreadyExists(String),

    /// A session is already active.
    #[error("user already logged in: {0}")]
    UserAlreadyLoggedIn(String),

    /// Logout requested for a user that does not own the session.
    #[error("cannot log out {0}: not the active user")]
    UserLogoutMismatch(String),

    /// Path is malformed or escapes the storage root.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Folder name pattern could not be parsed.
    #[error("invalid folder pattern: {0}")]
    InvalidPattern(String),

    /// Path is one of the reserved storage artifacts.
    #[error("reserved path: {0}")]
    ReservedPath(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted record could not be encoded or decoded.
    #[error("record error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A storage lock was poisoned by a panicking holder.
    #[error("storage lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_privileges_display() {
        let err = StorageError::InsufficientPrivileges("CREATE required".to_string());
        assert_eq!(err.to_string(), "insufficient privileges: CREATE required");
    }

    #[test]
    fn test_not_found_display() {
        let err = StorageError::FileNotFound("docs/a.txt".to_string());
        assert_eq!(err.to_string(), "docs/a.txt not found");
    }

    #[test]
    fn test_file_limit_display() {
        let err = StorageError::FileLimitExceeded {
            dir: "docs".to_string(),
            current: 2,
            added: 1,
            limit: 2,
        };
        assert_eq!(err.to_string(), "file limit exceeded for docs: 2 + 1 > 2");
    }

    #[test]
    fn test_storage_size_display() {
        let err = StorageError::StorageSizeExceeded {
            current: 10,
            added: 5,
            limit: 12,
        };
        assert_eq!(err.to_string(), "storage size exceeded: 10 + 5 > 12 bytes");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StorageError = io_err.into();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: StorageError = json_err.into();
        assert!(matches!(err, StorageError::Json(_)));
    }

    #[test]
    fn test_result_alias() {
        fn sample_ok() -> Result<i32> {
            Ok(42)
        }

        fn sample_err() -> Result<i32> {
            Err(StorageError::NoActiveUser)
        }

        assert_eq!(sample_ok().unwrap(), 42);
        assert!(sample_err().is_err());
    }
}
