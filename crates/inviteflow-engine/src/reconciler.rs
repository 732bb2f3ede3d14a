//! The reconciliation pass.
//!
//! One pass brings the children of one template in line with the items its
//! source filter currently selects:
//!
//! 1. load the template and its existing children (live and ended)
//! 2. resolve the filter into (anchor, target) pairs
//! 3. expand every pair and create-or-update the children that differ
//! 4. end the live children no pair asks for any more
//! 5. propagate record visibility for every live child the pass resolved,
//!    so records a failed patch left behind converge on a later pass
//!
//! Passes for one template never overlap inside a process. Nothing is kept
//! between passes; lock table entries are dropped once no task holds them.
//!
//! A child ended by some other terminator (an explicit supersession) is
//! left ended even when its pair matches again. Only the supersession's
//! revert brings it back.

use crate::config::EngineConfig;
use crate::decision::{DecisionClassifier, DefaultClassifier};
use crate::error::{EngineError, Result, SubmissionError};
use crate::expander::{child_id, expand};
use crate::propagator::{PropagationReport, Propagator};
use crate::resolver::resolve;
use crate::retry::RetryPolicy;
use dashmap::DashMap;
use futures_util::{StreamExt, stream};
use inviteflow_core::{ChildObject, ChildSpec, Template, Timestamp};
use inviteflow_storage::DynStore;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    Completed,
    /// Activation lies in the future and nothing has been materialized yet.
    NotYetActive,
    /// The template is expired or deleted; nothing was written.
    Closed,
}

/// Step at which a pair or child failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Expansion,
    Submission,
    End,
    Propagation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedPair {
    pub anchor_id: String,
    pub child_id: Option<String>,
    pub stage: FailureStage,
    pub error: String,
}

/// What one pass did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassReport {
    pub template_id: String,
    pub outcome: PassOutcome,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    /// Ended children that matched again and were brought back.
    pub revived: Vec<String>,
    /// Matching children left ended because another terminator ended them.
    pub superseded: Vec<String>,
    pub unchanged: usize,
    pub ended: Vec<String>,
    pub failed: Vec<FailedPair>,
    pub propagation: PropagationReport,
}

impl PassReport {
    fn new(template_id: impl Into<String>, outcome: PassOutcome) -> Self {
        Self {
            template_id: template_id.into(),
            outcome,
            created: Vec::new(),
            updated: Vec::new(),
            revived: Vec::new(),
            superseded: Vec::new(),
            unchanged: 0,
            ended: Vec::new(),
            failed: Vec::new(),
            propagation: PropagationReport::default(),
        }
    }

    /// Number of writes the pass issued successfully.
    pub fn writes(&self) -> usize {
        self.created.len()
            + self.updated.len()
            + self.revived.len()
            + self.ended.len()
            + self.propagation.patched.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.propagation.failed.is_empty()
    }

    /// True when `child_id` was written (created, updated or revived).
    pub fn wrote(&self, child_id: &str) -> bool {
        [&self.created, &self.updated, &self.revived]
            .iter()
            .any(|ids| ids.iter().any(|id| id == child_id))
    }
}

enum Submission {
    Created(ChildObject),
    Updated(ChildObject),
    Revived(ChildObject),
    Unchanged(ChildObject),
    Superseded(String),
    Failed(FailedPair),
}

/// Runs reconciliation passes against a store.
pub struct Reconciler {
    store: DynStore,
    config: EngineConfig,
    retry: RetryPolicy,
    classifier: Option<Arc<dyn DecisionClassifier>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Reconciler {
    pub fn new(store: DynStore, config: EngineConfig) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        Self {
            store,
            config,
            retry,
            classifier: None,
            locks: DashMap::new(),
        }
    }

    /// Like [`Reconciler::new`], rejecting an invalid configuration.
    pub fn try_new(store: DynStore, config: EngineConfig) -> Result<Self> {
        config.validate().map_err(EngineError::Config)?;
        Ok(Self::new(store, config))
    }

    /// Overrides the decision classifier derived from the venue domain.
    pub fn with_classifier(mut self, classifier: Arc<dyn DecisionClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub(crate) fn lock_for(&self, template_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(&self.locks.entry(template_id.to_string()).or_default())
    }

    /// Drops the lock entry for `template_id` unless a task still holds or
    /// awaits it. Callers must have dropped their own handle first.
    pub(crate) fn release_lock(&self, template_id: &str) {
        self.locks
            .remove_if(template_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    pub(crate) fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Runs one pass for `template_id` at the current time.
    pub async fn reconcile(&self, template_id: &str) -> Result<PassReport> {
        self.reconcile_at(template_id, inviteflow_core::now()).await
    }

    /// Runs one pass for `template_id` as of `now`.
    pub async fn reconcile_at(&self, template_id: &str, now: Timestamp) -> Result<PassReport> {
        let lock = self.lock_for(template_id);
        let report = {
            let _guard = lock.lock().await;
            self.reconcile_locked(template_id, now).await
        };
        drop(lock);
        self.release_lock(template_id);
        report
    }

    async fn reconcile_locked(&self, template_id: &str, now: Timestamp) -> Result<PassReport> {
        let template = self
            .retry
            .run("get_template", template_id, || self.store.get_template(template_id))
            .await
            .map_err(|e| EngineError::Storage(e.source))?
            .ok_or_else(|| EngineError::TemplateNotFound(template_id.to_string()))?;

        if template.is_closed_at(now) {
            tracing::info!(template_id = %template.id, "Template closed, skipping pass");
            return Ok(PassReport::new(&template.id, PassOutcome::Closed));
        }

        let existing = self
            .retry
            .run("get_child_objects", &template.id, || {
                self.store.get_child_objects(&template.id)
            })
            .await
            .map_err(|e| EngineError::Storage(e.source))?;

        if !template.is_active_at(now) && existing.is_empty() {
            tracing::info!(
                template_id = %template.id,
                cdate = %template.cdate,
                "Template not yet active and no children exist, skipping pass"
            );
            return Ok(PassReport::new(&template.id, PassOutcome::NotYetActive));
        }

        let report = self.run_pass(&template, existing, now).await;
        match &report {
            Ok(report) => tracing::info!(
                template_id = %template.id,
                created = report.created.len(),
                updated = report.updated.len(),
                revived = report.revived.len(),
                superseded = report.superseded.len(),
                unchanged = report.unchanged,
                ended = report.ended.len(),
                failed = report.failed.len(),
                patched = report.propagation.patched.len(),
                conflicts = report.propagation.conflicts.len(),
                "Child invitations reconciled"
            ),
            Err(e) => tracing::error!(
                template_id = %template.id,
                kind = e.kind(),
                error = %e,
                "Reconciliation pass aborted"
            ),
        }
        report
    }

    async fn run_pass(
        &self,
        template: &Template,
        existing: Vec<ChildObject>,
        now: Timestamp,
    ) -> Result<PassReport> {
        let domain = self
            .retry
            .run("get_domain", &template.domain, || self.store.get_domain(&template.domain))
            .await
            .map_err(|e| EngineError::Storage(e.source))?;

        let classifier: Arc<dyn DecisionClassifier> = match &self.classifier {
            Some(classifier) => Arc::clone(classifier),
            None => Arc::new(DefaultClassifier::for_domain(&domain)),
        };
        let pairs = resolve(
            self.store.as_ref(),
            &self.retry,
            template,
            &domain,
            classifier.as_ref(),
        )
        .await?;
        tracing::debug!(template_id = %template.id, pairs = pairs.len(), "Source filter resolved");

        let mut report = PassReport::new(&template.id, PassOutcome::Completed);
        // Ids and anchors that must survive this pass even though nothing
        // was written for them.
        let mut keep_ids: HashSet<String> = HashSet::new();
        let mut keep_anchors: HashSet<String> = HashSet::new();

        let mut specs: Vec<ChildSpec> = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            match expand(template, &domain, pair) {
                Ok(spec) => {
                    if !keep_ids.insert(spec.id.clone()) {
                        tracing::warn!(
                            template_id = %template.id,
                            child_id = %spec.id,
                            anchor_id = %pair.anchor.id,
                            "Duplicate child id, keeping the first anchor"
                        );
                        continue;
                    }
                    specs.push(spec);
                }
                Err(e) => {
                    tracing::warn!(
                        template_id = %template.id,
                        anchor_id = %pair.anchor.id,
                        error = %e,
                        "Template expansion failed"
                    );
                    let id = child_id(template, &domain, pair).ok();
                    if let Some(id) = &id {
                        keep_ids.insert(id.clone());
                    }
                    keep_anchors.insert(pair.anchor.id.clone());
                    report.failed.push(FailedPair {
                        anchor_id: pair.anchor.id.clone(),
                        child_id: id,
                        stage: FailureStage::Expansion,
                        error: e.to_string(),
                    });
                }
            }
        }

        let terminator = template
            .terminator
            .clone()
            .unwrap_or_else(|| domain.meta_invitation_id.clone());
        let current: HashMap<&str, &ChildObject> =
            existing.iter().map(|child| (child.id.as_str(), child)).collect();
        let limit = self.config.concurrency.max_in_flight.max(1);

        let submissions: Vec<Submission> = stream::iter(&specs)
            .map(|spec| {
                let previous = current.get(spec.id.as_str()).copied();
                self.submit(template, spec, previous, &terminator)
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut written: Vec<ChildObject> = Vec::new();
        let mut in_sync: Vec<ChildObject> = Vec::new();
        for submission in submissions {
            match submission {
                Submission::Created(child) => {
                    report.created.push(child.id.clone());
                    written.push(child);
                }
                Submission::Updated(child) => {
                    report.updated.push(child.id.clone());
                    written.push(child);
                }
                Submission::Revived(child) => {
                    report.revived.push(child.id.clone());
                    written.push(child);
                }
                Submission::Unchanged(child) => {
                    report.unchanged += 1;
                    in_sync.push(child);
                }
                Submission::Superseded(id) => report.superseded.push(id),
                Submission::Failed(failed) => report.failed.push(failed),
            }
        }

        let stale: Vec<&ChildObject> = existing
            .iter()
            .filter(|child| {
                child.is_live()
                    && !keep_ids.contains(&child.id)
                    && !keep_anchors.contains(&child.anchor_id)
            })
            .collect();

        let ends: Vec<(String, std::result::Result<ChildObject, SubmissionError>)> =
            stream::iter(stale)
                .map(|child| {
                    let terminator = terminator.as_str();
                    async move {
                        let result = self
                            .retry
                            .run("end_child_object", &child.id, || {
                                self.store.end_child_object(&child.id, now, terminator)
                            })
                            .await;
                        (child.anchor_id.clone(), result)
                    }
                })
                .buffer_unordered(limit)
                .collect()
                .await;

        for (anchor_id, result) in ends {
            match result {
                Ok(child) => {
                    tracing::debug!(
                        template_id = %template.id,
                        child_id = %child.id,
                        "Child ended"
                    );
                    report.ended.push(child.id);
                }
                Err(e) => {
                    tracing::warn!(
                        template_id = %template.id,
                        child_id = %e.target,
                        error = %e,
                        "Ending child failed"
                    );
                    report.failed.push(FailedPair {
                        anchor_id,
                        child_id: Some(e.target.clone()),
                        stage: FailureStage::End,
                        error: e.to_string(),
                    });
                }
            }
        }

        let propagator = Propagator::new(
            self.store.as_ref(),
            self.retry,
            domain.meta_invitation_id.as_str(),
        );
        let with_policy = written
            .iter()
            .chain(&in_sync)
            .filter(|child| child.record_policy.is_some());
        let propagations: Vec<_> = stream::iter(with_policy)
            .map(|child| {
                let propagator = &propagator;
                async move { (child, propagator.propagate(child).await) }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        for (child, result) in propagations {
            match result {
                Ok(propagation) => report.propagation.merge(propagation),
                Err(e) => {
                    tracing::warn!(
                        template_id = %template.id,
                        child_id = %child.id,
                        error = %e,
                        "Loading records for propagation failed"
                    );
                    report.failed.push(FailedPair {
                        anchor_id: child.anchor_id.clone(),
                        child_id: Some(child.id.clone()),
                        stage: FailureStage::Propagation,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.created.sort();
        report.updated.sort();
        report.revived.sort();
        report.superseded.sort();
        report.ended.sort();
        report.propagation.patched.sort();
        Ok(report)
    }

    async fn submit(
        &self,
        template: &Template,
        spec: &ChildSpec,
        current: Option<&ChildObject>,
        terminator: &str,
    ) -> Submission {
        if let Some(child) = current {
            if child.is_live() && child.matches(spec) {
                tracing::debug!(child_id = %spec.id, "Child up to date");
                return Submission::Unchanged(child.clone());
            }
            if let Some(ended_by) = child.ended_by.as_deref()
                && !child.is_live()
                && ended_by != terminator
            {
                tracing::info!(
                    template_id = %template.id,
                    child_id = %spec.id,
                    ended_by,
                    "Child superseded by another terminator, leaving it ended"
                );
                return Submission::Superseded(spec.id.clone());
            }
        }

        let result = self
            .retry
            .run("create_or_update_child_object", &spec.id, || {
                self.store.create_or_update_child_object(spec, &template.id)
            })
            .await;

        match (result, current) {
            (Ok(child), None) => {
                tracing::debug!(
                    child_id = %child.id,
                    anchor_id = %spec.anchor_id,
                    "Child created"
                );
                Submission::Created(child)
            }
            (Ok(child), Some(previous)) if previous.is_live() => {
                tracing::debug!(child_id = %child.id, "Child updated");
                Submission::Updated(child)
            }
            (Ok(child), Some(_)) => {
                tracing::debug!(child_id = %child.id, "Ended child revived");
                Submission::Revived(child)
            }
            (Err(e), _) => {
                tracing::warn!(
                    template_id = %template.id,
                    child_id = %spec.id,
                    attempts = e.attempts,
                    error = %e,
                    "Child submission failed"
                );
                Submission::Failed(FailedPair {
                    anchor_id: spec.anchor_id.clone(),
                    child_id: Some(spec.id.clone()),
                    stage: FailureStage::Submission,
                    error: e.to_string(),
                })
            }
        }
    }
}
