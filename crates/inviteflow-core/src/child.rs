use crate::record::RecordPolicy;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Desired state of one child invitation, as produced by expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildSpec {
    pub id: String,
    pub template_id: String,
    /// Target item id (the forum the child belongs to).
    pub forum: String,
    /// Item whose number determines the child id.
    pub anchor_id: String,
    pub content: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_policy: Option<RecordPolicy>,
}

/// A materialized child invitation as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildObject {
    pub id: String,
    pub template_id: String,
    pub forum: String,
    pub anchor_id: String,
    pub content: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_policy: Option<RecordPolicy>,
    pub cdate: Timestamp,
    pub mdate: Timestamp,
    /// End timestamp; set children are retained, never purged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddate: Option<Timestamp>,
    /// Invitation that signed the last create/update/restore.
    pub signer: String,
    /// Terminator that ended this child, if ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_by: Option<String>,
}

impl ChildObject {
    /// Materializes `spec` as a new live child.
    pub fn from_spec(spec: &ChildSpec, signer: impl Into<String>, at: Timestamp) -> Self {
        Self {
            id: spec.id.clone(),
            template_id: spec.template_id.clone(),
            forum: spec.forum.clone(),
            anchor_id: spec.anchor_id.clone(),
            content: spec.content.clone(),
            record_policy: spec.record_policy.clone(),
            cdate: at,
            mdate: at,
            ddate: None,
            signer: signer.into(),
            ended_by: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.ddate.is_none()
    }

    /// True when the stored state already equals `spec`.
    pub fn matches(&self, spec: &ChildSpec) -> bool {
        self.id == spec.id
            && self.template_id == spec.template_id
            && self.forum == spec.forum
            && self.anchor_id == spec.anchor_id
            && self.content == spec.content
            && self.record_policy == spec.record_policy
    }
}
