use crate::faults::{FaultPlan, Trigger};
use inviteflow_core::{ChildObject, DependentRecord, Item, Template, VenueDomain};
use inviteflow_storage::StorageError;
use papaya::HashMap as PapayaHashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory store backend using papaya lock-free HashMaps.
///
/// This implementation provides:
/// - Lock-free concurrent access to every collection
/// - Child invitations retained after they are ended
/// - A write counter, so callers can assert that a pass wrote nothing
/// - A [`FaultPlan`] to make writes to chosen ids fail or stall
#[derive(Debug, Default)]
pub struct InMemoryStore {
    pub(crate) domains: PapayaHashMap<String, VenueDomain>,
    pub(crate) templates: PapayaHashMap<String, Template>,
    /// Forum items and replies, keyed by id.
    pub(crate) items: PapayaHashMap<String, Item>,
    pub(crate) children: PapayaHashMap<String, ChildObject>,
    pub(crate) records: PapayaHashMap<String, DependentRecord>,
    writes: AtomicU64,
    faults: FaultPlan,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Seeding ====================

    pub fn put_domain(&self, domain: VenueDomain) {
        self.domains.pin().insert(domain.venue_id.clone(), domain);
    }

    pub fn put_template(&self, template: Template) {
        self.templates.pin().insert(template.id.clone(), template);
    }

    /// Stores an item. Replies attached to `item.replies` are stored as
    /// items of their own.
    pub fn put_item(&self, mut item: Item) {
        let replies = std::mem::take(&mut item.replies);
        let guard = self.items.pin();
        guard.insert(item.id.clone(), item);
        for reply in replies {
            guard.insert(reply.id.clone(), reply);
        }
    }

    pub fn remove_item(&self, id: &str) -> Option<Item> {
        self.items.pin().remove(id).cloned()
    }

    /// Stores a child as-is, bypassing write accounting.
    pub fn put_child(&self, child: ChildObject) {
        self.children.pin().insert(child.id.clone(), child);
    }

    /// Stores a record. When `id` is empty a fresh one is generated.
    pub fn put_record(&self, mut record: DependentRecord) -> String {
        if record.id.is_empty() {
            record.id = uuid::Uuid::new_v4().to_string();
        }
        let id = record.id.clone();
        self.records.pin().insert(id.clone(), record);
        id
    }

    // ==================== Inspection ====================

    pub fn child(&self, id: &str) -> Option<ChildObject> {
        self.children.pin().get(id).cloned()
    }

    pub fn record(&self, id: &str) -> Option<DependentRecord> {
        self.records.pin().get(id).cloned()
    }

    pub fn template(&self, id: &str) -> Option<Template> {
        self.templates.pin().get(id).cloned()
    }

    /// Number of successful writes since creation or the last reset.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_write_count(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    // ==================== Internals ====================

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    /// Applies the fault armed for `id`, if any, before a write.
    pub(crate) async fn check_fault(&self, operation: &str, id: &str) -> Result<(), StorageError> {
        // The guard inside `trigger` is released before any await.
        let trigger = self.faults.trigger(operation, id);
        match trigger {
            Some(Trigger::Fail(err)) => Err(err),
            Some(Trigger::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}
