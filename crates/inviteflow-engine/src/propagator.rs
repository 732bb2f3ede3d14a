//! Visibility propagation onto records posted under a child invitation.
//!
//! When a child's record policy changes, records already posted under it
//! are brought in line with one signed patch each. Two guards keep the
//! engine from changing who can see a record behind the author's back:
//! a policy that computes `everyone` never opens a restricted record, and
//! a record whose readers already go beyond the computed list is never
//! narrowed by it.

use crate::error::SubmissionError;
use crate::retry::RetryPolicy;
use inviteflow_core::record::resolve_self;
use inviteflow_core::{
    ChildObject, DependentRecord, ReaderList, ReaderSpec, RecordPolicy, SELF_MARKER,
};
use inviteflow_storage::{FieldReadersPatch, RecordPatch, ReviewStore};
use serde::Serialize;
use std::fmt;

/// Why part or all of a record's patch was withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Readers are user-configured; the whole record is left alone.
    ParamReaders,
    /// The policy computes `everyone` for a restricted record.
    NoWidening,
    /// The record's readers are a strict superset of the computed ones;
    /// only the readers change is withheld.
    NoNarrowing,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParamReaders => write!(f, "param_readers"),
            Self::NoWidening => write!(f, "no_widening"),
            Self::NoNarrowing => write!(f, "no_narrowing"),
        }
    }
}

/// Planned change for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPlan {
    pub record_id: String,
    /// Empty when nothing needs to change.
    pub patch: RecordPatch,
    pub skipped: Option<SkipReason>,
}

/// Outcome of propagating one child's policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropagationReport {
    pub patched: Vec<String>,
    pub unchanged: usize,
    /// Records whose patch was withheld in whole or in part.
    pub conflicts: Vec<(String, SkipReason)>,
    /// Records whose patch failed, with the error text.
    pub failed: Vec<(String, String)>,
}

impl PropagationReport {
    pub fn merge(&mut self, other: PropagationReport) {
        self.patched.extend(other.patched);
        self.unchanged += other.unchanged;
        self.conflicts.extend(other.conflicts);
        self.failed.extend(other.failed);
    }
}

/// Final list for `patterns`, with the self marker resolved to the
/// record's signer (or dropped when the record is unsigned).
fn finalize(patterns: &[String], signer: Option<&str>) -> ReaderList {
    match signer {
        Some(signer) => resolve_self(patterns, signer),
        None => patterns
            .iter()
            .filter(|p| p.as_str() != SELF_MARKER)
            .cloned()
            .collect(),
    }
}

/// Computes the patch bringing `record` in line with `policy`.
pub fn plan_record(
    policy: &RecordPolicy,
    record: &DependentRecord,
    edit_invitation: &str,
) -> RecordPlan {
    let mut plan = RecordPlan {
        record_id: record.id.clone(),
        patch: RecordPatch::new(edit_invitation),
        skipped: None,
    };

    let patterns = match &policy.readers {
        ReaderSpec::Fixed(patterns) => patterns,
        ReaderSpec::Param { .. } => {
            plan.skipped = Some(SkipReason::ParamReaders);
            return plan;
        }
    };

    let signer = record.first_signature();
    let readers = finalize(patterns, signer);

    if readers.is_public() && !record.readers.is_public() {
        plan.skipped = Some(SkipReason::NoWidening);
        return plan;
    }

    if !readers.is_empty() && record.readers != readers {
        if record.readers.is_strict_superset_of(&readers) && !readers.is_public() {
            plan.skipped = Some(SkipReason::NoNarrowing);
        } else {
            plan.patch.nonreaders = policy
                .nonreaders
                .as_deref()
                .map(|patterns| finalize(patterns, signer));
            plan.patch.readers = Some(readers);
        }
    }

    let writers = finalize(&policy.writers, signer);
    if !writers.is_empty() && record.writers != writers {
        plan.patch.writers = Some(writers);
    }

    for (key, patterns) in &policy.content_readers {
        if !record.content.contains_key(key) {
            continue;
        }
        let wanted = finalize(patterns, signer);
        if record.field_readers(key) == wanted {
            continue;
        }
        let change = if wanted.is_empty() {
            FieldReadersPatch::Delete
        } else {
            FieldReadersPatch::Set(wanted)
        };
        plan.patch.content.insert(key.clone(), change);
    }

    plan
}

/// Applies a child's record policy to the records posted under it.
pub struct Propagator<'a> {
    store: &'a dyn ReviewStore,
    retry: RetryPolicy,
    edit_invitation: &'a str,
}

impl<'a> Propagator<'a> {
    /// `edit_invitation` signs every patch, normally the venue's meta invitation.
    pub fn new(store: &'a dyn ReviewStore, retry: RetryPolicy, edit_invitation: &'a str) -> Self {
        Self {
            store,
            retry,
            edit_invitation,
        }
    }

    /// Loads the child's records and patches the ones that drifted.
    pub async fn propagate(
        &self,
        child: &ChildObject,
    ) -> Result<PropagationReport, SubmissionError> {
        let Some(policy) = &child.record_policy else {
            return Ok(PropagationReport::default());
        };
        let records = self
            .retry
            .run("get_dependent_records", &child.id, || {
                self.store.get_dependent_records(&child.id)
            })
            .await?;
        Ok(self.apply(child, policy, &records).await)
    }

    /// Patches `records` against `policy`. Failures are recorded per record.
    pub async fn apply(
        &self,
        child: &ChildObject,
        policy: &RecordPolicy,
        records: &[DependentRecord],
    ) -> PropagationReport {
        let mut report = PropagationReport::default();

        for record in records {
            let plan = plan_record(policy, record, self.edit_invitation);

            if let Some(reason) = plan.skipped {
                tracing::info!(
                    child_id = %child.id,
                    record_id = %record.id,
                    reason = %reason,
                    "Propagation conflict, keeping record readers"
                );
                report.conflicts.push((record.id.clone(), reason));
            }

            if plan.patch.is_empty() {
                if plan.skipped.is_none() {
                    report.unchanged += 1;
                }
                continue;
            }

            let patch = &plan.patch;
            match self
                .retry
                .run("patch_record", &record.id, || self.store.patch_record(&record.id, patch))
                .await
            {
                Ok(_) => {
                    tracing::debug!(
                        child_id = %child.id,
                        record_id = %record.id,
                        touched = patch.touched(),
                        "Record visibility patched"
                    );
                    report.patched.push(record.id.clone());
                }
                Err(e) => {
                    tracing::warn!(
                        child_id = %child.id,
                        record_id = %record.id,
                        error = %e,
                        "Record patch failed"
                    );
                    report.failed.push((record.id.clone(), e.to_string()));
                }
            }
        }

        report
    }
}
