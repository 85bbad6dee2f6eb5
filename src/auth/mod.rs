//! Access control for quotastore.
//!
//! This module provides the privilege model, registered users,
//! and the checks every storage operation runs before touching disk.

pub mod permission;
mod privilege;
mod registry;
mod user;

pub use permission::{check_privilege, require_superuser, FolderScope, PermissionError};
pub use privilege::{expand_grant, has_exact, Privilege, PrivilegeScope, PrivilegeSet};
pub use registry::UserRegistry;
pub use user::{Credentials, User};
