//! The store contract consumed by the reconciliation engine.

use async_trait::async_trait;
use inviteflow_core::{
    ChildObject, ChildSpec, DependentRecord, Item, Template, Timestamp, VenueDomain,
};

use crate::error::StorageError;
use crate::types::{ItemQuery, RecordPatch};

/// Backing store for items, invitations and records.
///
/// The engine never keeps state of its own between passes; everything it
/// needs is read through this trait and every effect is a call on it.
/// Implementations must be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use inviteflow_storage::{ReviewStore, StorageError};
///
/// async fn load(store: &dyn ReviewStore, id: &str) -> Result<Template, StorageError> {
///     store
///         .get_template(id)
///         .await?
///         .ok_or_else(|| StorageError::not_found("template", id))
/// }
/// ```
#[async_trait]
pub trait ReviewStore: Send + Sync {
    // ==================== Configuration ====================

    /// Reads the venue configuration.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the venue is unknown.
    async fn get_domain(&self, venue_id: &str) -> Result<VenueDomain, StorageError>;

    /// Reads a template invitation. Returns `None` if it does not exist.
    async fn get_template(&self, id: &str) -> Result<Option<Template>, StorageError>;

    // ==================== Items ====================

    /// Reads one item. Returns `None` if it does not exist.
    async fn get_item(&self, id: &str) -> Result<Option<Item>, StorageError>;

    /// Returns the forum items in the queried collections, ordered by
    /// ascending number, with their replies attached when requested.
    async fn get_items_by_filter(&self, query: &ItemQuery) -> Result<Vec<Item>, StorageError>;

    // ==================== Child invitations ====================

    /// Returns every child of a template, live and ended.
    async fn get_child_objects(&self, template_id: &str)
    -> Result<Vec<ChildObject>, StorageError>;

    /// Returns every child attached to a forum, across templates.
    async fn get_child_objects_by_forum(
        &self,
        forum_id: &str,
    ) -> Result<Vec<ChildObject>, StorageError>;

    /// Writes `spec` under its id. An existing child keeps its creation
    /// date and becomes live again if it was ended.
    async fn create_or_update_child_object(
        &self,
        spec: &ChildSpec,
        signer: &str,
    ) -> Result<ChildObject, StorageError>;

    /// Sets the end date of a child. The child is retained.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the child does not exist.
    async fn end_child_object(
        &self,
        id: &str,
        at: Timestamp,
        terminator: &str,
    ) -> Result<ChildObject, StorageError>;

    /// Clears the end date of a child.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the child does not exist.
    async fn restore_child_object(
        &self,
        id: &str,
        signer: &str,
    ) -> Result<ChildObject, StorageError>;

    // ==================== Dependent records ====================

    /// Returns the records posted under a child invitation.
    async fn get_dependent_records(
        &self,
        child_id: &str,
    ) -> Result<Vec<DependentRecord>, StorageError>;

    /// Applies `patch` to a record as one atomic edit.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    async fn patch_record(
        &self,
        id: &str,
        patch: &RecordPatch,
    ) -> Result<DependentRecord, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test that ReviewStore is object-safe
    fn _assert_store_object_safe(_: &dyn ReviewStore) {}
}
