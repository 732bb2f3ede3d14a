use crate::readers::ReaderList;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One content field of an item or record: its value and an optional
/// per-field readers override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentField {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readers: Option<ReaderList>,
}

impl ContentField {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            readers: None,
        }
    }

    pub fn with_readers(mut self, readers: ReaderList) -> Self {
        self.readers = Some(readers);
        self
    }
}

pub type Content = BTreeMap<String, ContentField>;

/// A document under review (the forum) or one of its replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub number: u64,
    /// Id of the root item of the thread; equals `id` for forum items.
    pub forum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replyto: Option<String>,
    /// Invitations this item was posted under, the first being canonical.
    #[serde(default)]
    pub invitations: Vec<String>,
    #[serde(default)]
    pub signatures: Vec<String>,
    #[serde(default)]
    pub readers: ReaderList,
    #[serde(default)]
    pub writers: ReaderList,
    #[serde(default)]
    pub content: Content,
    /// Reply details, only populated on forum items returned by filtered queries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Item>,
}

impl Item {
    /// Creates a forum item with the given id and number.
    pub fn new(id: impl Into<String>, number: u64) -> Self {
        let id = id.into();
        Self {
            forum: id.clone(),
            id,
            number,
            replyto: None,
            invitations: Vec::new(),
            signatures: Vec::new(),
            readers: ReaderList::new(),
            writers: ReaderList::new(),
            content: Content::new(),
            replies: Vec::new(),
        }
    }

    /// Creates a reply posted in `forum` under `invitation`.
    pub fn reply(
        id: impl Into<String>,
        number: u64,
        forum: impl Into<String>,
        replyto: impl Into<String>,
        invitation: impl Into<String>,
    ) -> Self {
        let mut item = Self::new(id, number);
        item.forum = forum.into();
        item.replyto = Some(replyto.into());
        item.invitations = vec![invitation.into()];
        item
    }

    pub fn is_forum(&self) -> bool {
        self.forum == self.id
    }

    pub fn content_value(&self, key: &str) -> Option<&Value> {
        self.content.get(key).map(|field| &field.value)
    }

    pub fn content_str(&self, key: &str) -> Option<&str> {
        self.content_value(key).and_then(Value::as_str)
    }

    pub fn content_flag(&self, key: &str) -> bool {
        self.content_value(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The `venueid` content field that places an item in a collection.
    pub fn venue_id(&self) -> Option<&str> {
        self.content_str("venueid")
    }

    pub fn first_signature(&self) -> Option<&str> {
        self.signatures.first().map(String::as_str)
    }

    pub fn first_invitation(&self) -> Option<&str> {
        self.invitations.first().map(String::as_str)
    }

    /// Looks up `id` among this forum item and its fetched replies.
    pub fn find_in_thread(&self, id: &str) -> Option<&Item> {
        if self.id == id {
            return Some(self);
        }
        self.replies.iter().find(|reply| reply.id == id)
    }

    pub fn with_content(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content.insert(key.into(), ContentField::new(value));
        self
    }

    pub fn with_readers<I, S>(mut self, readers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.readers = readers.into_iter().collect();
        self
    }

    pub fn with_writers<I, S>(mut self, writers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.writers = writers.into_iter().collect();
        self
    }

    pub fn with_signatures<I, S>(mut self, signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signatures = signatures.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_invitation(mut self, invitation: impl Into<String>) -> Self {
        self.invitations.push(invitation.into());
        self
    }

    pub fn with_reply(mut self, reply: Item) -> Self {
        self.replies.push(reply);
        self
    }
}
