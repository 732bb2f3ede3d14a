//! In-memory store backend for inviteflow.
//!
//! This crate provides an in-memory implementation of the `ReviewStore`
//! trait from `inviteflow-storage`, using papaya lock-free HashMaps for
//! concurrent access. It backs the engine's tests: the write counter and
//! the [`FaultPlan`] stand in for a mocking framework.
//!
//! # Example
//!
//! ```ignore
//! use inviteflow_db_memory::InMemoryStore;
//! use inviteflow_storage::ReviewStore;
//!
//! let store = InMemoryStore::new();
//! store.put_template(template);
//! let children = store.get_child_objects("X/-/Review").await?;
//! ```

mod faults;
mod storage;
mod store_impl;

pub use faults::{Fault, FaultPlan};
pub use storage::InMemoryStore;

// Re-export the store trait for convenience
pub use inviteflow_storage::{ReviewStore, StorageError};

/// Creates a new in-memory store behind the shared trait object.
pub fn create_store() -> inviteflow_storage::DynStore {
    std::sync::Arc::new(InMemoryStore::new())
}
