//! Access-controlled, quota-enforced local storage.
//!
//! This module provides:
//! - The storage model and its persisted records
//! - Privilege and quota gates around every filesystem mutation
//! - Lazy directory listings
//! - A registry that shares open storages between threads

mod engine;
pub mod layout;
pub mod listing;
mod model;
mod operations;
pub mod pattern;
pub mod quota;
pub mod records;
mod registry;

pub use engine::{Storage, StorageSettings};
pub use listing::{EntryKind, ListEntry, ListMode, ListOptions, Listing, Order, Walk};
pub use model::{normalize_extension, StorageModel};
pub use quota::QuotaTracker;
pub use registry::{SharedStorage, StorageHandle, StorageRegistry};
