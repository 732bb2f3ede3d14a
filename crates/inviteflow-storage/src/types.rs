//! Query and patch types exchanged with the store.

use inviteflow_core::ReaderList;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selection of items by collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuery {
    /// Items whose `venueid` content equals one of these.
    pub venue_ids: Vec<String>,
    /// Attach each forum's replies to the returned items.
    #[serde(default = "default_true")]
    pub details_replies: bool,
}

fn default_true() -> bool {
    true
}

impl ItemQuery {
    /// Creates a query over `venue_ids`, replies included.
    #[must_use]
    pub fn new<I, S>(venue_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            venue_ids: venue_ids.into_iter().map(Into::into).collect(),
            details_replies: true,
        }
    }

    #[must_use]
    pub fn without_replies(mut self) -> Self {
        self.details_replies = false;
        self
    }
}

/// Change to the readers override of one content field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldReadersPatch {
    /// Replace the override with this list.
    Set(ReaderList),
    /// Remove the override so the field falls back to the record readers.
    Delete,
}

/// Single atomic edit of a dependent record's visibility.
///
/// Only the fields that are `Some` (and the listed content keys) change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    /// Invitation signing the edit.
    pub invitation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readers: Option<ReaderList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonreaders: Option<ReaderList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writers: Option<ReaderList>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub content: BTreeMap<String, FieldReadersPatch>,
}

impl RecordPatch {
    #[must_use]
    pub fn new(invitation: impl Into<String>) -> Self {
        Self {
            invitation: invitation.into(),
            ..Default::default()
        }
    }

    /// True when applying the patch would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readers.is_none()
            && self.nonreaders.is_none()
            && self.writers.is_none()
            && self.content.is_empty()
    }

    /// Number of record attributes touched, content keys counted one by one.
    #[must_use]
    pub fn touched(&self) -> usize {
        usize::from(self.readers.is_some())
            + usize::from(self.nonreaders.is_some())
            + usize::from(self.writers.is_some())
            + self.content.len()
    }
}
