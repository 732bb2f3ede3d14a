//! Dependent records and the visibility policy they follow.

use crate::item::Content;
use crate::readers::{ReaderList, SELF_MARKER};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Reader template for records: either a fixed pattern list or a
/// user-configured parameter the engine must leave alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReaderSpec {
    Fixed(Vec<String>),
    Param { param: Value },
}

impl ReaderSpec {
    pub fn patterns(&self) -> Option<&[String]> {
        match self {
            Self::Fixed(patterns) => Some(patterns),
            Self::Param { .. } => None,
        }
    }

    pub fn is_param(&self) -> bool {
        matches!(self, Self::Param { .. })
    }
}

impl Default for ReaderSpec {
    fn default() -> Self {
        Self::Fixed(Vec::new())
    }
}

/// Reader/writer template applied to records created under a child.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPolicy {
    #[serde(default)]
    pub readers: ReaderSpec,
    #[serde(default)]
    pub writers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonreaders: Option<Vec<String>>,
    /// Per content key reader patterns. An empty list means "no override".
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub content_readers: BTreeMap<String, Vec<String>>,
}

impl RecordPolicy {
    pub fn with_readers<I, S>(mut self, readers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.readers = ReaderSpec::Fixed(readers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_writers<I, S>(mut self, writers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.writers = writers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_nonreaders<I, S>(mut self, nonreaders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nonreaders = Some(nonreaders.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_content_readers<I, S>(mut self, key: impl Into<String>, readers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_readers
            .insert(key.into(), readers.into_iter().map(Into::into).collect());
        self
    }
}

/// Replaces the self marker in `patterns` with `signer` and deduplicates.
pub fn resolve_self(patterns: &[String], signer: &str) -> ReaderList {
    patterns
        .iter()
        .map(|pattern| {
            if pattern == SELF_MARKER {
                signer.to_string()
            } else {
                pattern.clone()
            }
        })
        .collect()
}

/// A record (review, comment, ...) posted under a child invitation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentRecord {
    pub id: String,
    /// Id of the child invitation the record was posted under.
    pub invitation: String,
    pub forum: String,
    #[serde(default)]
    pub signatures: Vec<String>,
    #[serde(default)]
    pub readers: ReaderList,
    #[serde(default)]
    pub writers: ReaderList,
    #[serde(default)]
    pub nonreaders: ReaderList,
    #[serde(default)]
    pub content: Content,
}

impl DependentRecord {
    pub fn new(
        id: impl Into<String>,
        invitation: impl Into<String>,
        forum: impl Into<String>,
        signer: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            invitation: invitation.into(),
            forum: forum.into(),
            signatures: vec![signer.into()],
            readers: ReaderList::new(),
            writers: ReaderList::new(),
            nonreaders: ReaderList::new(),
            content: Content::new(),
        }
    }

    pub fn first_signature(&self) -> Option<&str> {
        self.signatures.first().map(String::as_str)
    }

    /// Current readers override of a content field; empty when unset.
    pub fn field_readers(&self, key: &str) -> ReaderList {
        self.content
            .get(key)
            .and_then(|field| field.readers.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ContentField;
    use serde_json::json;

    #[test]
    fn test_reader_spec_untagged() {
        let fixed: ReaderSpec = serde_json::from_value(json!(["X", "{signatures}"])).unwrap();
        assert_eq!(fixed.patterns().map(<[String]>::len), Some(2));

        let param: ReaderSpec =
            serde_json::from_value(json!({ "param": { "items": [] } })).unwrap();
        assert!(param.is_param());
        assert!(param.patterns().is_none());
    }

    #[test]
    fn test_resolve_self_dedups_in_order() {
        let patterns = vec![
            "X/Program_Committee".to_string(),
            SELF_MARKER.to_string(),
            "~Ada1".to_string(),
        ];
        let readers = resolve_self(&patterns, "~Ada1");
        assert_eq!(readers.to_vec(), vec!["X/Program_Committee", "~Ada1"]);
    }

    #[test]
    fn test_field_readers_default_empty() {
        let mut record = DependentRecord::new("n1", "X/Paper1/-/Review", "f1", "~Ada1");
        assert!(record.field_readers("rating").is_empty());
        record.content.insert(
            "rating".into(),
            ContentField::new(4).with_readers(["X".to_string()].into_iter().collect()),
        );
        assert_eq!(record.field_readers("rating").to_vec(), vec!["X"]);
        assert_eq!(record.first_signature(), Some("~Ada1"));
    }

    #[test]
    fn test_policy_builder() {
        let policy = RecordPolicy::default()
            .with_readers(["X", SELF_MARKER])
            .with_writers(["X"])
            .with_nonreaders(["X/Paper1/Authors"])
            .with_content_readers("confidential", ["X"]);
        assert_eq!(policy.writers, vec!["X"]);
        assert!(policy.content_readers.contains_key("confidential"));
    }
}
