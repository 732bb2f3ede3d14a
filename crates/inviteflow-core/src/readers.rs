//! Ordered reader/writer lists.
//!
//! Reader lists behave like insertion-ordered sets: duplicates are dropped
//! on insert and the first entry keeps its position. Equality is
//! order-sensitive, since consumers treat the first entry as the canonical
//! signer.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Group id that makes a record public.
pub const EVERYONE: &str = "everyone";

/// Placeholder replaced by a record's first signature.
pub const SELF_MARKER: &str = "{signatures}";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ReaderList(IndexSet<String>);

impl ReaderList {
    pub fn new() -> Self {
        Self(IndexSet::new())
    }

    /// Appends `reader` unless already present. Returns whether it was added.
    pub fn push(&mut self, reader: impl Into<String>) -> bool {
        self.0.insert(reader.into())
    }

    pub fn extend<I, S>(&mut self, readers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for reader in readers {
            self.push(reader);
        }
    }

    /// Removes `reader`, keeping the relative order of the others.
    pub fn remove(&mut self, reader: &str) -> bool {
        self.0.shift_remove(reader)
    }

    pub fn contains(&self, reader: &str) -> bool {
        self.0.contains(reader)
    }

    pub fn is_public(&self) -> bool {
        self.contains(EVERYONE)
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// True when every entry of `other` is also in `self`, ignoring order.
    pub fn is_superset_of(&self, other: &ReaderList) -> bool {
        other.iter().all(|reader| self.contains(reader))
    }

    /// True when `self` holds everything in `other` and at least one more entry.
    pub fn is_strict_superset_of(&self, other: &ReaderList) -> bool {
        self.len() > other.len() && self.is_superset_of(other)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl PartialEq for ReaderList {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().eq(other.0.iter())
    }
}

impl Eq for ReaderList {}

impl<S: Into<String>> FromIterator<S> for ReaderList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = ReaderList::new();
        list.extend(iter);
        list
    }
}

impl From<Vec<String>> for ReaderList {
    fn from(readers: Vec<String>) -> Self {
        readers.into_iter().collect()
    }
}

impl From<ReaderList> for Vec<String> {
    fn from(list: ReaderList) -> Self {
        list.0.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a ReaderList {
    type Item = &'a String;
    type IntoIter = indexmap::set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
