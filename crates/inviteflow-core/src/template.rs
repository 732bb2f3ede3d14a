//! Template invitations and their field templates.

use crate::error::{CoreError, Result};
use crate::filter::SourceFilter;
use crate::id::invitation_name;
use crate::record::RecordPolicy;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Kind of a field declared in a template's field-template.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Target item id.
    NoteId,
    /// Target item number.
    NoteNumber,
    /// Anchor item id.
    ReplyTo,
    /// Anchor item number.
    ReplyNumber,
    /// Anchor's first signature.
    ReplyToSignatures,
    /// First signature of the item the anchor replies to.
    ReplyToReplyToSignatures,
    /// Anchor invitation turned into a group prefix plus anchor number.
    InvitationPrefix,
    /// Computed reader list for records under the child.
    NoteReaders,
    /// Opaque value copied after placeholder substitution.
    PassThrough(Value),
}

impl FieldKind {
    /// Classifies a declared key; unknown keys become pass-through.
    pub fn classify(key: &str, value: Value) -> Self {
        match key {
            "noteId" => Self::NoteId,
            "noteNumber" => Self::NoteNumber,
            "replyto" => Self::ReplyTo,
            "replyNumber" => Self::ReplyNumber,
            "replytoSignatures" => Self::ReplyToSignatures,
            "replytoReplytoSignatures" => Self::ReplyToReplyToSignatures,
            "invitationPrefix" => Self::InvitationPrefix,
            "noteReaders" => Self::NoteReaders,
            _ => Self::PassThrough(value),
        }
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self, Self::PassThrough(_))
    }
}

/// Declared child content keys, keyed by output field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Value>", into = "BTreeMap<String, Value>")]
pub struct FieldTemplate {
    fields: BTreeMap<String, FieldKind>,
}

impl FieldTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `key`; the value only matters for pass-through keys.
    pub fn declare(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        let kind = FieldKind::classify(&key, value);
        self.fields.insert(key, kind);
        self
    }

    pub fn declares(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldKind)> {
        self.fields.iter().map(|(key, kind)| (key.as_str(), kind))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for FieldTemplate {
    fn from(map: BTreeMap<String, Value>) -> Self {
        map.into_iter()
            .fold(FieldTemplate::new(), |fields, (key, value)| fields.declare(key, value))
    }
}

impl From<FieldTemplate> for BTreeMap<String, Value> {
    fn from(template: FieldTemplate) -> Self {
        template
            .fields
            .into_iter()
            .map(|(key, kind)| match kind {
                FieldKind::PassThrough(value) => (key, value),
                _ => (key, Value::Object(Default::default())),
            })
            .collect()
    }
}

/// A template invitation: the rule materialized into one child per match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    /// Venue whose domain configuration applies.
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_id: Option<String>,
    #[serde(default)]
    pub source: SourceFilter,
    #[serde(default)]
    pub fields: FieldTemplate,
    /// Template parameters, also the defaults for pass-through placeholders.
    #[serde(default)]
    pub content: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_policy: Option<RecordPolicy>,
    pub cdate: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expdate: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddate: Option<Timestamp>,
    /// Invitation used to end children; defaults to the venue meta invitation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminator: Option<String>,
}

impl Template {
    pub fn new(id: impl Into<String>, domain: impl Into<String>, cdate: Timestamp) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            super_id: None,
            source: SourceFilter::default(),
            fields: FieldTemplate::default(),
            content: BTreeMap::new(),
            record_policy: None,
            cdate,
            expdate: None,
            ddate: None,
            terminator: None,
        }
    }

    pub fn with_source(mut self, source: SourceFilter) -> Self {
        self.source = source;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>) -> Self {
        self.fields = self.fields.declare(key, Value::Null);
        self
    }

    pub fn with_pass_through(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields = self.fields.declare(key, value);
        self
    }

    pub fn with_content(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    pub fn with_record_policy(mut self, policy: RecordPolicy) -> Self {
        self.record_policy = Some(policy);
        self
    }

    /// Short name of the template, the part after `/-/`.
    pub fn name(&self) -> &str {
        invitation_name(&self.id).unwrap_or(&self.id)
    }

    pub fn is_active_at(&self, now: Timestamp) -> bool {
        !self.cdate.is_after(now)
    }

    /// Deleted, or past its expiration date.
    pub fn is_closed_at(&self, now: Timestamp) -> bool {
        self.ddate.is_some_and(|ddate| !ddate.is_after(now))
            || self.expdate.is_some_and(|expdate| !expdate.is_after(now))
    }

    /// String list parameter from the template content.
    pub fn content_list(&self, key: &str) -> Result<Option<Vec<String>>> {
        let Some(value) = self.content.get(key) else {
            return Ok(None);
        };
        match value {
            Value::Null => Ok(None),
            Value::Array(entries) => entries
                .iter()
                .map(|entry| {
                    entry.as_str().map(String::from).ok_or_else(|| {
                        CoreError::invalid_template(
                            &self.id,
                            format!("content.{key} must contain only strings"),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            _ => Err(CoreError::invalid_template(
                &self.id,
                format!("content.{key} must be a list"),
            )),
        }
    }

    pub fn content_flag(&self, key: &str) -> bool {
        self.content
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
