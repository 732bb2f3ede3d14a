//! # inviteflow-storage
//!
//! Store abstraction for the inviteflow reconciliation engine.
//!
//! This crate defines the trait and types a backend must provide. It does
//! not contain any implementation; see `inviteflow-db-memory` for the
//! in-memory one.
//!
//! The main trait is [`ReviewStore`], which covers:
//! - venue configuration and template lookup
//! - item queries by collection, with reply details
//! - child invitation upsert, end and restore
//! - dependent record listing and visibility patches

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::ReviewStore;
pub use types::{FieldReadersPatch, ItemQuery, RecordPatch};

/// Type alias for a store result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared store trait object.
pub type DynStore = std::sync::Arc<dyn ReviewStore>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use inviteflow_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::ReviewStore;
    pub use crate::types::{FieldReadersPatch, ItemQuery, RecordPatch};
    pub use crate::{DynStore, StorageResult};
}
