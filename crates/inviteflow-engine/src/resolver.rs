//! Filter resolution: which items a template applies to.
//!
//! Resolution reads the item collections named by the template's source
//! filter and narrows them with the filter's predicates. The result is an
//! ordered list of (anchor, target) pairs: the anchor is the item the child
//! is scoped to, the target is the forum that item belongs to.

use crate::decision::DecisionClassifier;
use crate::error::ResolutionError;
use crate::retry::RetryPolicy;
use inviteflow_core::{Item, SourceFilter, Template, VenueDomain};
use inviteflow_storage::{ItemQuery, ReviewStore};
use serde_json::Value;

/// One match of a template's source filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    /// Item the child invitation is scoped to.
    pub anchor: Item,
    /// Forum item, with its fetched replies.
    pub target: Item,
}

impl Pair {
    pub fn is_reply(&self) -> bool {
        self.anchor.id != self.target.id
    }
}

/// Fetches the candidate items for `template` and selects the pairs.
pub async fn resolve(
    store: &dyn ReviewStore,
    retry: &RetryPolicy,
    template: &Template,
    domain: &VenueDomain,
    classifier: &dyn DecisionClassifier,
) -> Result<Vec<Pair>, ResolutionError> {
    let filter = &template.source;
    filter
        .validate()
        .map_err(|e| ResolutionError::MalformedFilter {
            template_id: template.id.clone(),
            message: e.to_string(),
        })?;

    let venue_ids = filter
        .venueid
        .clone()
        .unwrap_or_else(|| vec![domain.submission_venue_id.clone()]);
    let query = ItemQuery::new(venue_ids);
    let mut items = retry
        .run("get_items_by_filter", &template.id, || store.get_items_by_filter(&query))
        .await
        .map_err(|e| ResolutionError::Store(e.source))?;

    // Before decisions are posted, submissions may sit directly under the
    // venue or in the rejected collection.
    if items.is_empty() {
        tracing::debug!(
            template_id = %template.id,
            "No items in source collections, falling back to venue and rejected collections"
        );
        let fallback = ItemQuery::new([domain.venue_id.clone(), domain.rejected_venue_id.clone()]);
        items = retry
            .run("get_items_by_filter", &template.id, || store.get_items_by_filter(&fallback))
            .await
            .map_err(|e| ResolutionError::Store(e.source))?;
    }

    select_pairs(filter, domain, items, classifier)
}

/// Applies the filter predicates to already fetched forum items.
///
/// Pairs come out in ascending anchor number; ties keep fetch order.
pub fn select_pairs(
    filter: &SourceFilter,
    domain: &VenueDomain,
    items: Vec<Item>,
    classifier: &dyn DecisionClassifier,
) -> Result<Vec<Pair>, ResolutionError> {
    let items = items.into_iter().filter(|item| {
        filter
            .with_decision_accept
            .is_none_or(|accept| has_decision(item, domain, classifier, accept))
            && filter
                .readers
                .as_ref()
                .is_none_or(|required| required.iter().all(|r| item.readers.contains(r)))
            && filter
                .content
                .as_ref()
                .is_none_or(|expected| content_matches(item, expected.iter()))
    });

    let mut pairs = Vec::new();
    match filter.reply_suffix() {
        Some(suffix) => {
            for item in items {
                for reply in &item.replies {
                    let Some(invitation) = reply.first_invitation() else {
                        return Err(ResolutionError::DanglingReply {
                            reply_id: reply.id.clone(),
                            forum_id: item.id.clone(),
                            message: "reply has no invitation".into(),
                        });
                    };
                    if !invitation.ends_with(&suffix) {
                        continue;
                    }
                    if reply.forum != item.id {
                        return Err(ResolutionError::DanglingReply {
                            reply_id: reply.id.clone(),
                            forum_id: item.id.clone(),
                            message: format!("reply belongs to forum {}", reply.forum),
                        });
                    }
                    pairs.push(Pair {
                        anchor: reply.clone(),
                        target: item.clone(),
                    });
                }
            }
        }
        None => pairs.extend(items.map(|item| Pair {
            anchor: item.clone(),
            target: item,
        })),
    }

    pairs.sort_by_key(|pair| pair.anchor.number);
    Ok(pairs)
}

fn has_decision(
    item: &Item,
    domain: &VenueDomain,
    classifier: &dyn DecisionClassifier,
    accept: bool,
) -> bool {
    let invitation = domain.decision_invitation(item.number);
    item.replies.iter().any(|reply| {
        reply.invitations.iter().any(|i| *i == invitation)
            && reply
                .content_str(&domain.decision_field_name)
                .is_some_and(|decision| classifier.is_accept(decision) == accept)
    })
}

fn content_matches<'a>(
    item: &Item,
    mut expected: impl Iterator<Item = (&'a String, &'a Value)>,
) -> bool {
    expected.all(|(key, value)| match item.content_value(key) {
        Some(actual) => actual == value,
        None => value.is_null(),
    })
}
