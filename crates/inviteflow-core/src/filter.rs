//! Declarative source filters.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Predicate selecting the items a template applies to. All present
/// predicates must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceFilter {
    /// Collections (item `venueid` values) in scope. `None` means the
    /// venue's submission collection.
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub venueid: Option<Vec<String>>,
    /// Keep items with a decision reply whose outcome is accept (`true`)
    /// or reject (`false`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_decision_accept: Option<bool>,
    /// Keep items whose readers include all of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readers: Option<Vec<String>>,
    /// Keep items whose content values equal these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<BTreeMap<String, Value>>,
    /// Re-target matching to replies posted under an invitation ending in
    /// `/-/{reply_to}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = Option::<OneOrMany>::deserialize(deserializer)?;
    Ok(parsed.map(|value| match value {
        OneOrMany::One(venue) => vec![venue],
        OneOrMany::Many(venues) => venues,
    }))
}

impl SourceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_venue(mut self, venue_id: impl Into<String>) -> Self {
        self.venueid.get_or_insert_with(Vec::new).push(venue_id.into());
        self
    }

    pub fn with_decision_accept(mut self, accept: bool) -> Self {
        self.with_decision_accept = Some(accept);
        self
    }

    pub fn with_readers<I, S>(mut self, readers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.readers = Some(readers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_content(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_reply_to(mut self, invitation_name: impl Into<String>) -> Self {
        self.reply_to = Some(invitation_name.into());
        self
    }

    /// Invitation suffix a reply's first invitation must end with.
    pub fn reply_suffix(&self) -> Option<String> {
        self.reply_to.as_ref().map(|name| format!("/-/{name}"))
    }

    /// Rejects filters that cannot select anything meaningful.
    pub fn validate(&self) -> Result<()> {
        if let Some(venues) = &self.venueid {
            if venues.is_empty() {
                return Err(CoreError::invalid_filter("venueid must list at least one venue"));
            }
            if venues.iter().any(|venue| venue.trim().is_empty()) {
                return Err(CoreError::invalid_filter("venueid entries must not be empty"));
            }
        }
        if let Some(content) = &self.content
            && content.keys().any(|key| key.trim().is_empty())
        {
            return Err(CoreError::invalid_filter("content predicate keys must not be empty"));
        }
        if let Some(reply_to) = &self.reply_to
            && reply_to.trim().is_empty()
        {
            return Err(CoreError::invalid_filter("reply_to must not be empty"));
        }
        Ok(())
    }
}
