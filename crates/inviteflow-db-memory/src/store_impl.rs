//! Implementation of the ReviewStore trait for InMemoryStore.

use async_trait::async_trait;
use inviteflow_core::{
    ChildObject, ChildSpec, DependentRecord, Item, Template, Timestamp, VenueDomain,
};
use inviteflow_storage::{FieldReadersPatch, ItemQuery, RecordPatch, ReviewStore, StorageError};

use crate::storage::InMemoryStore;

impl InMemoryStore {
    /// Forum items of the queried collections with their replies.
    fn query_items(&self, query: &ItemQuery) -> Vec<Item> {
        let guard = self.items.pin();
        let mut forums: Vec<Item> = guard
            .values()
            .filter(|item| item.is_forum())
            .filter(|item| {
                item.venue_id()
                    .is_some_and(|venue| query.venue_ids.iter().any(|v| v == venue))
            })
            .cloned()
            .collect();
        forums.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.id.cmp(&b.id)));

        if query.details_replies {
            for forum in &mut forums {
                let mut replies: Vec<Item> = guard
                    .values()
                    .filter(|item| !item.is_forum() && item.forum == forum.id)
                    .cloned()
                    .collect();
                replies.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.id.cmp(&b.id)));
                forum.replies = replies;
            }
        }
        forums
    }

    fn children_where(&self, keep: impl Fn(&ChildObject) -> bool) -> Vec<ChildObject> {
        let mut children: Vec<ChildObject> = self
            .children
            .pin()
            .values()
            .filter(|child| keep(child))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.id.cmp(&b.id));
        children
    }
}

fn apply_patch(record: &mut DependentRecord, patch: &RecordPatch) -> Result<(), StorageError> {
    for (key, change) in &patch.content {
        match (record.content.get_mut(key), change) {
            (Some(field), FieldReadersPatch::Set(readers)) => field.readers = Some(readers.clone()),
            (Some(field), FieldReadersPatch::Delete) => field.readers = None,
            (None, FieldReadersPatch::Delete) => {}
            (None, FieldReadersPatch::Set(_)) => {
                return Err(StorageError::invalid_data(format!(
                    "record {} has no content field '{key}'",
                    record.id
                )));
            }
        }
    }
    if let Some(readers) = &patch.readers {
        record.readers = readers.clone();
    }
    if let Some(nonreaders) = &patch.nonreaders {
        record.nonreaders = nonreaders.clone();
    }
    if let Some(writers) = &patch.writers {
        record.writers = writers.clone();
    }
    Ok(())
}

#[async_trait]
impl ReviewStore for InMemoryStore {
    async fn get_domain(&self, venue_id: &str) -> Result<VenueDomain, StorageError> {
        self.domains
            .pin()
            .get(venue_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("domain", venue_id))
    }

    async fn get_template(&self, id: &str) -> Result<Option<Template>, StorageError> {
        Ok(self.templates.pin().get(id).cloned())
    }

    async fn get_item(&self, id: &str) -> Result<Option<Item>, StorageError> {
        Ok(self.items.pin().get(id).cloned())
    }

    async fn get_items_by_filter(&self, query: &ItemQuery) -> Result<Vec<Item>, StorageError> {
        Ok(self.query_items(query))
    }

    async fn get_child_objects(
        &self,
        template_id: &str,
    ) -> Result<Vec<ChildObject>, StorageError> {
        Ok(self.children_where(|child| child.template_id == template_id))
    }

    async fn get_child_objects_by_forum(
        &self,
        forum_id: &str,
    ) -> Result<Vec<ChildObject>, StorageError> {
        Ok(self.children_where(|child| child.forum == forum_id))
    }

    async fn create_or_update_child_object(
        &self,
        spec: &ChildSpec,
        signer: &str,
    ) -> Result<ChildObject, StorageError> {
        if spec.id.is_empty() {
            return Err(StorageError::invalid_data("child id must not be empty"));
        }
        self.check_fault("create_or_update_child_object", &spec.id)
            .await?;

        let now = inviteflow_core::now();
        let child = {
            let guard = self.children.pin();
            let child = match guard.get(&spec.id) {
                Some(existing) => ChildObject {
                    cdate: existing.cdate,
                    ..ChildObject::from_spec(spec, signer, now)
                },
                None => ChildObject::from_spec(spec, signer, now),
            };
            guard.insert(spec.id.clone(), child.clone());
            child
        };
        self.record_write();
        Ok(child)
    }

    async fn end_child_object(
        &self,
        id: &str,
        at: Timestamp,
        terminator: &str,
    ) -> Result<ChildObject, StorageError> {
        self.check_fault("end_child_object", id).await?;

        let child = {
            let guard = self.children.pin();
            let mut child = guard
                .get(id)
                .cloned()
                .ok_or_else(|| StorageError::not_found("child", id))?;
            child.ddate = Some(at);
            child.mdate = at;
            child.ended_by = Some(terminator.to_string());
            guard.insert(id.to_string(), child.clone());
            child
        };
        self.record_write();
        Ok(child)
    }

    async fn restore_child_object(
        &self,
        id: &str,
        signer: &str,
    ) -> Result<ChildObject, StorageError> {
        self.check_fault("restore_child_object", id).await?;

        let child = {
            let guard = self.children.pin();
            let mut child = guard
                .get(id)
                .cloned()
                .ok_or_else(|| StorageError::not_found("child", id))?;
            child.ddate = None;
            child.ended_by = None;
            child.mdate = inviteflow_core::now();
            child.signer = signer.to_string();
            guard.insert(id.to_string(), child.clone());
            child
        };
        self.record_write();
        Ok(child)
    }

    async fn get_dependent_records(
        &self,
        child_id: &str,
    ) -> Result<Vec<DependentRecord>, StorageError> {
        let mut records: Vec<DependentRecord> = self
            .records
            .pin()
            .values()
            .filter(|record| record.invitation == child_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn patch_record(
        &self,
        id: &str,
        patch: &RecordPatch,
    ) -> Result<DependentRecord, StorageError> {
        if patch.invitation.is_empty() {
            return Err(StorageError::invalid_data("record edits must be signed"));
        }
        self.check_fault("patch_record", id).await?;

        let record = {
            let guard = self.records.pin();
            let mut record = guard
                .get(id)
                .cloned()
                .ok_or_else(|| StorageError::not_found("record", id))?;
            apply_patch(&mut record, patch)?;
            guard.insert(id.to_string(), record.clone());
            record
        };
        self.record_write();
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::Fault;
    use inviteflow_core::{ContentField, ReaderList};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn spec(id: &str, n: u64) -> ChildSpec {
        ChildSpec {
            id: id.to_string(),
            template_id: "X/-/Review".into(),
            forum: format!("f{n}"),
            anchor_id: format!("f{n}"),
            content: BTreeMap::from([("noteNumber".to_string(), json!(n))]),
            record_policy: None,
        }
    }

    fn readers(list: &[&str]) -> ReaderList {
        list.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_items_by_filter_sorted_with_replies() {
        let store = InMemoryStore::new();
        store.put_item(Item::new("f2", 2).with_content("venueid", "X/Submission"));
        store.put_item(
            Item::new("f1", 1)
                .with_content("venueid", "X/Submission")
                .with_reply(Item::reply("r2", 2, "f1", "f1", "X/Submission1/-/Comment"))
                .with_reply(Item::reply("r1", 1, "f1", "f1", "X/Submission1/-/Comment")),
        );
        store.put_item(Item::new("f3", 3).with_content("venueid", "X/Withdrawn"));

        let items = store
            .get_items_by_filter(&ItemQuery::new(["X/Submission"]))
            .await
            .unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f2"]);
        let reply_ids: Vec<_> = items[0].replies.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(reply_ids, vec!["r1", "r2"]);

        let bare = store
            .get_items_by_filter(&ItemQuery::new(["X/Submission"]).without_replies())
            .await
            .unwrap();
        assert!(bare[0].replies.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_end_and_restore() {
        let store = InMemoryStore::new();
        let created = store
            .create_or_update_child_object(&spec("X/Paper1/-/Review", 1), "X/-/Review")
            .await
            .unwrap();
        assert!(created.is_live());

        let ended = store
            .end_child_object(&created.id, Timestamp::from_millis(5), "X/-/Edit")
            .await
            .unwrap();
        assert_eq!(ended.ddate, Some(Timestamp::from_millis(5)));
        assert_eq!(ended.ended_by.as_deref(), Some("X/-/Edit"));
        assert_eq!(store.get_child_objects("X/-/Review").await.unwrap().len(), 1);

        let restored = store
            .restore_child_object(&created.id, "X/-/Edit")
            .await
            .unwrap();
        assert!(restored.is_live());
        assert_eq!(restored.cdate, created.cdate);
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn test_upsert_revives_and_keeps_cdate() {
        let store = InMemoryStore::new();
        let mut child = ChildObject::from_spec(
            &spec("X/Paper1/-/Review", 1),
            "X/-/Review",
            Timestamp::from_millis(1),
        );
        child.ddate = Some(Timestamp::from_millis(2));
        store.put_child(child);

        let revived = store
            .create_or_update_child_object(&spec("X/Paper1/-/Review", 1), "X/-/Review")
            .await
            .unwrap();
        assert!(revived.is_live());
        assert_eq!(revived.cdate, Timestamp::from_millis(1));
    }

    #[tokio::test]
    async fn test_end_missing_child_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .end_child_object("nope", Timestamp::from_millis(1), "X/-/Edit")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_faulted_write_is_not_counted() {
        let store = InMemoryStore::new();
        store.faults().arm("X/Paper3/-/Review", Fault::Transient(1));

        let err = store
            .create_or_update_child_object(&spec("X/Paper3/-/Review", 3), "X/-/Review")
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.write_count(), 0);

        store
            .create_or_update_child_object(&spec("X/Paper3/-/Review", 3), "X/-/Review")
            .await
            .unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_patch_record_applies_atomically() {
        let store = InMemoryStore::new();
        let mut record = DependentRecord::new("n1", "X/Paper1/-/Review", "f1", "~Ada1");
        record.readers = readers(&["X", "~Ada1"]);
        record.content.insert(
            "confidential".into(),
            ContentField::new("x").with_readers(readers(&["X"])),
        );
        record.content.insert("rating".into(), ContentField::new(3));
        store.put_record(record);

        let mut patch = RecordPatch::new("X/-/Edit");
        patch.readers = Some(readers(&["X", "X/Paper1/Reviewers", "~Ada1"]));
        patch
            .content
            .insert("confidential".into(), FieldReadersPatch::Delete);
        patch.content.insert(
            "rating".into(),
            FieldReadersPatch::Set(readers(&["X", "~Ada1"])),
        );
        let patched = store.patch_record("n1", &patch).await.unwrap();

        assert_eq!(patched.readers.len(), 3);
        assert!(patched.field_readers("confidential").is_empty());
        assert_eq!(patched.field_readers("rating").to_vec(), vec!["X", "~Ada1"]);
        assert_eq!(
            store.get_dependent_records("X/Paper1/-/Review").await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_patch_record_rejects_unknown_field_without_change() {
        let store = InMemoryStore::new();
        let mut record = DependentRecord::new("n1", "X/Paper1/-/Review", "f1", "~Ada1");
        record.readers = readers(&["X"]);
        store.put_record(record);

        let mut patch = RecordPatch::new("X/-/Edit");
        patch.readers = Some(readers(&["X", "~Ada1"]));
        patch
            .content
            .insert("missing".into(), FieldReadersPatch::Set(readers(&["X"])));
        assert!(store.patch_record("n1", &patch).await.is_err());
        assert_eq!(store.record("n1").unwrap().readers.to_vec(), vec!["X"]);
    }
}
