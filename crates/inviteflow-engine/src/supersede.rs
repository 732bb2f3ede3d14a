//! Explicit supersession of a forum's children.
//!
//! Some workflow steps (a desk rejection, a withdrawal) end every child
//! invitation attached to a forum regardless of what the templates' filters
//! say. The terminator is recorded on each ended child, so the step can be
//! reverted by restoring exactly the children it ended. Regular passes leave
//! such children ended.
//!
//! Both operations hold the pass lock of every template owning a child of
//! the forum, so they never interleave with a pass for those templates.

use crate::error::{EngineError, Result};
use crate::reconciler::Reconciler;
use futures_util::{StreamExt, stream};
use inviteflow_core::ChildObject;
use serde::Serialize;
use std::collections::BTreeSet;
use tokio::sync::OwnedMutexGuard;

/// Children touched by a supersession or its reversal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SupersedeReport {
    pub forum_id: String,
    pub terminator_id: String,
    pub touched: Vec<String>,
    /// Children that could not be changed, with the error text.
    pub failed: Vec<(String, String)>,
}

impl SupersedeReport {
    fn new(forum_id: &str, terminator_id: &str) -> Self {
        Self {
            forum_id: forum_id.to_string(),
            terminator_id: terminator_id.to_string(),
            ..Default::default()
        }
    }
}

impl Reconciler {
    /// Ends every live child of `forum_id` except the terminator itself
    /// and the ids in `keep`.
    pub async fn supersede_forum(
        &self,
        forum_id: &str,
        terminator_id: &str,
        keep: &[String],
    ) -> Result<SupersedeReport> {
        let forum = self
            .retry()
            .run("get_item", forum_id, || self.store().get_item(forum_id))
            .await
            .map_err(|e| EngineError::Storage(e.source))?;
        if !forum.is_some_and(|item| item.is_forum()) {
            return Err(EngineError::ForumNotFound(forum_id.to_string()));
        }

        let (templates, guards) = self.lock_forum(forum_id).await?;
        let result = self.end_forum_children(forum_id, terminator_id, keep).await;
        self.unlock_forum(templates, guards);

        let report = result?;
        tracing::info!(
            forum_id,
            terminator_id,
            ended = report.touched.len(),
            failed = report.failed.len(),
            "Forum children superseded"
        );
        Ok(report)
    }

    /// Restores the children of `forum_id` that `terminator_id` ended.
    pub async fn revert_supersession(
        &self,
        forum_id: &str,
        terminator_id: &str,
    ) -> Result<SupersedeReport> {
        let (templates, guards) = self.lock_forum(forum_id).await?;
        let result = self.restore_forum_children(forum_id, terminator_id).await;
        self.unlock_forum(templates, guards);

        let report = result?;
        tracing::info!(
            forum_id,
            terminator_id,
            restored = report.touched.len(),
            failed = report.failed.len(),
            "Forum supersession reverted"
        );
        Ok(report)
    }

    async fn end_forum_children(
        &self,
        forum_id: &str,
        terminator_id: &str,
        keep: &[String],
    ) -> Result<SupersedeReport> {
        let children = self.forum_children(forum_id).await?;
        let now = inviteflow_core::now();
        let targets: Vec<&ChildObject> = children
            .iter()
            .filter(|child| {
                child.is_live() && child.id != terminator_id && !keep.contains(&child.id)
            })
            .collect();

        let results: Vec<_> = stream::iter(targets)
            .map(|child| async move {
                let result = self
                    .retry()
                    .run("end_child_object", &child.id, || {
                        self.store().end_child_object(&child.id, now, terminator_id)
                    })
                    .await;
                (child.id.clone(), result.map(|_| ()))
            })
            .buffer_unordered(self.config().concurrency.max_in_flight.max(1))
            .collect()
            .await;

        Ok(collect(SupersedeReport::new(forum_id, terminator_id), results))
    }

    async fn restore_forum_children(
        &self,
        forum_id: &str,
        terminator_id: &str,
    ) -> Result<SupersedeReport> {
        let children = self.forum_children(forum_id).await?;
        let targets: Vec<&ChildObject> = children
            .iter()
            .filter(|child| !child.is_live() && child.ended_by.as_deref() == Some(terminator_id))
            .collect();

        let results: Vec<_> = stream::iter(targets)
            .map(|child| async move {
                let result = self
                    .retry()
                    .run("restore_child_object", &child.id, || {
                        self.store().restore_child_object(&child.id, terminator_id)
                    })
                    .await;
                (child.id.clone(), result.map(|_| ()))
            })
            .buffer_unordered(self.config().concurrency.max_in_flight.max(1))
            .collect()
            .await;

        Ok(collect(SupersedeReport::new(forum_id, terminator_id), results))
    }

    async fn forum_children(&self, forum_id: &str) -> Result<Vec<ChildObject>> {
        self.retry()
            .run("get_child_objects_by_forum", forum_id, || {
                self.store().get_child_objects_by_forum(forum_id)
            })
            .await
            .map_err(|e| EngineError::Storage(e.source))
    }

    /// Takes the pass locks of the templates owning children of `forum_id`,
    /// in id order so concurrent supersessions cannot deadlock.
    async fn lock_forum(
        &self,
        forum_id: &str,
    ) -> Result<(Vec<String>, Vec<OwnedMutexGuard<()>>)> {
        let templates: Vec<String> = self
            .forum_children(forum_id)
            .await?
            .into_iter()
            .map(|child| child.template_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut guards = Vec::with_capacity(templates.len());
        for template_id in &templates {
            guards.push(self.lock_for(template_id).lock_owned().await);
        }
        Ok((templates, guards))
    }

    fn unlock_forum(&self, templates: Vec<String>, guards: Vec<OwnedMutexGuard<()>>) {
        drop(guards);
        for template_id in &templates {
            self.release_lock(template_id);
        }
    }
}

fn collect<E: std::fmt::Display>(
    mut report: SupersedeReport,
    results: Vec<(String, std::result::Result<(), E>)>,
) -> SupersedeReport {
    for (id, result) in results {
        match result {
            Ok(()) => report.touched.push(id),
            Err(e) => {
                tracing::warn!(child_id = %id, error = %e, "Supersession step failed");
                report.failed.push((id, e.to_string()));
            }
        }
    }
    report.touched.sort();
    report
}
