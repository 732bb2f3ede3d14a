//! Integration tests for reconciliation passes against the in-memory store.

mod common;

use std::time::Duration;

use common::{Harness, META, NOW, REVIEW, review_id, review_template, submission};
use inviteflow_core::{Item, SourceFilter, Template, Timestamp};
use inviteflow_db_memory::Fault;
use inviteflow_engine::{EngineError, FailureStage, PassOutcome};
use serde_json::json;

// =============================================================================
// Materialization
// =============================================================================

#[tokio::test]
async fn test_first_pass_creates_one_child_per_submission() {
    let h = Harness::seeded(3);

    let report = h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.created, vec![review_id(1), review_id(2), review_id(3)]);
    assert!(report.is_clean());

    let child = h.store.child(&review_id(2)).unwrap();
    assert!(child.is_live());
    assert_eq!(child.forum, "f2");
    assert_eq!(child.signer, REVIEW);
    assert_eq!(child.content["noteNumber"], json!(2));
    assert_eq!(child.content["noteId"], json!("f2"));
    assert_eq!(child.content["title"], json!("Review of Paper 2"));
    assert_eq!(
        child.content["noteReaders"],
        json!(["X/Program_Chairs", "X/Submission2/Reviewers"])
    );
}

#[tokio::test]
async fn test_second_pass_writes_nothing() {
    let h = Harness::seeded(3);
    h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();
    h.store.reset_write_count();

    let report = h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    assert_eq!(h.store.write_count(), 0);
    assert_eq!(report.writes(), 0);
    assert_eq!(report.unchanged, 3);
}

#[tokio::test]
async fn test_child_ids_stable_when_items_are_added() {
    let h = Harness::seeded(2);
    h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();
    let before = h.store.child(&review_id(1)).unwrap();

    h.store.put_item(submission(5));
    let report = h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    assert_eq!(report.created, vec![review_id(5)]);
    assert_eq!(report.unchanged, 2);
    assert_eq!(h.store.child(&review_id(1)).unwrap(), before);
}

#[tokio::test]
async fn test_template_change_updates_children_in_place() {
    let h = Harness::seeded(2);
    h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    h.store.put_template(
        review_template().with_content("review_readers", json!(["X/Program_Chairs"])),
    );
    let report = h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    assert_eq!(report.updated, vec![review_id(1), review_id(2)]);
    assert!(report.created.is_empty());
    let child = h.store.child(&review_id(1)).unwrap();
    assert_eq!(child.content["noteReaders"], json!(["X/Program_Chairs"]));
}

#[tokio::test]
async fn test_concurrent_passes_for_one_template_do_not_overlap() {
    let h = Harness::seeded(3);

    let (a, b) = tokio::join!(
        h.reconciler.reconcile_at(REVIEW, NOW),
        h.reconciler.reconcile_at(REVIEW, NOW)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.created.len() + b.created.len(), 3);
    assert_eq!(a.unchanged + b.unchanged, 3);
    assert!(a.updated.is_empty() && b.updated.is_empty());
}

// =============================================================================
// Filters
// =============================================================================

#[tokio::test]
async fn test_reply_to_without_replies_yields_no_children() {
    let h = Harness::seeded(2);
    let rebuttal = Template::new("X/-/Rebuttal", "X", Timestamp::from_millis(0))
        .with_source(SourceFilter::new().with_reply_to("Official_Review"));
    h.store.put_template(rebuttal);

    let report = h.reconciler.reconcile_at("X/-/Rebuttal", NOW).await.unwrap();

    assert_eq!(report.outcome, PassOutcome::Completed);
    assert!(report.created.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn test_reply_to_scopes_children_to_replies() {
    let h = Harness::new();
    let review = Item::reply("r1", 2, "f1", "f1", "X/Submission1/-/Official_Review")
        .with_signatures(["X/Submission1/Reviewer_a"]);
    h.store.put_item(submission(1).with_reply(review));
    h.store.put_template(
        Template::new("X/-/Rebuttal", "X", Timestamp::from_millis(0))
            .with_source(SourceFilter::new().with_reply_to("Official_Review"))
            .with_field("replyto")
            .with_field("replytoSignatures"),
    );

    let report = h.reconciler.reconcile_at("X/-/Rebuttal", NOW).await.unwrap();

    let id = "X/Submission1/Official_Review2/-/Rebuttal";
    assert_eq!(report.created, vec![id.to_string()]);
    let child = h.store.child(id).unwrap();
    assert_eq!(child.forum, "f1");
    assert_eq!(child.anchor_id, "r1");
    assert_eq!(child.content["replyto"], json!("r1"));
    assert_eq!(child.content["replytoSignatures"], json!("X/Submission1/Reviewer_a"));
    assert_eq!(child.content["noteNumber"], json!(1));
}

#[tokio::test]
async fn test_decision_filter_keeps_accepted_submissions() {
    let h = Harness::new();
    let decision = |forum: &str, number: u64, text: &str| {
        Item::reply(
            format!("d{number}"),
            1,
            forum,
            forum,
            format!("X/Submission{number}/-/Decision"),
        )
        .with_content("decision", text)
    };
    h.store.put_item(submission(1).with_reply(decision("f1", 1, "Accept (Oral)")));
    h.store.put_item(submission(2).with_reply(decision("f2", 2, "Reject")));
    h.store.put_item(submission(3));
    h.store.put_template(
        review_template().with_source(SourceFilter::new().with_decision_accept(true)),
    );

    let report = h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    assert_eq!(report.created, vec![review_id(1)]);
}

#[tokio::test]
async fn test_malformed_filter_aborts_pass() {
    let h = Harness::seeded(1);
    h.store.put_template(review_template().with_source(SourceFilter {
        venueid: Some(Vec::new()),
        ..Default::default()
    }));

    let err = h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap_err();

    assert_eq!(err.kind(), "resolution");
    assert!(h.store.child(&review_id(1)).is_none());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_item_leaving_the_filter_ends_its_child() {
    let h = Harness::seeded(2);
    h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();
    let untouched = h.store.child(&review_id(1)).unwrap();

    h.store.put_item(submission(2).with_content("venueid", "X/Withdrawn_Submission"));
    let report = h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    assert_eq!(report.ended, vec![review_id(2)]);
    assert_eq!(report.unchanged, 1);
    let ended = h.store.child(&review_id(2)).unwrap();
    assert_eq!(ended.ddate, Some(NOW));
    assert_eq!(ended.ended_by.as_deref(), Some(META));
    assert_eq!(h.store.child(&review_id(1)).unwrap(), untouched);
}

#[tokio::test]
async fn test_item_returning_revives_its_child() {
    let h = Harness::seeded(2);
    h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();
    let created = h.store.child(&review_id(2)).unwrap();
    h.store.put_item(submission(2).with_content("venueid", "X/Withdrawn_Submission"));
    h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    h.store.put_item(submission(2));
    let report = h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    assert_eq!(report.revived, vec![review_id(2)]);
    let revived = h.store.child(&review_id(2)).unwrap();
    assert!(revived.is_live());
    assert!(revived.ended_by.is_none());
    assert_eq!(revived.cdate, created.cdate);
}

#[tokio::test]
async fn test_template_terminator_is_recorded() {
    let h = Harness::seeded(1);
    let mut template = review_template();
    template.terminator = Some("X/-/Review_Stage_End".into());
    h.store.put_template(template);
    h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    h.store.remove_item("f1");
    let report = h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    assert_eq!(report.ended, vec![review_id(1)]);
    let ended = h.store.child(&review_id(1)).unwrap();
    assert_eq!(ended.ended_by.as_deref(), Some("X/-/Review_Stage_End"));
}

#[tokio::test]
async fn test_not_yet_active_template_writes_nothing() {
    let h = Harness::seeded(2);
    let mut template = review_template();
    template.cdate = Timestamp::from_millis(2_000);
    h.store.put_template(template);

    let report = h
        .reconciler
        .reconcile_at(REVIEW, Timestamp::from_millis(1_000))
        .await
        .unwrap();

    assert_eq!(report.outcome, PassOutcome::NotYetActive);
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn test_closed_template_is_skipped() {
    let h = Harness::seeded(2);
    h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();
    let mut template = review_template();
    template.expdate = Some(NOW);
    h.store.put_template(template);
    h.store.remove_item("f1");
    h.store.reset_write_count();

    let report = h
        .reconciler
        .reconcile_at(REVIEW, NOW.plus_millis(1))
        .await
        .unwrap();

    assert_eq!(report.outcome, PassOutcome::Closed);
    assert_eq!(h.store.write_count(), 0);
    assert!(h.store.child(&review_id(1)).unwrap().is_live());
}

#[tokio::test]
async fn test_unknown_template_is_an_error() {
    let h = Harness::seeded(1);

    let err = h.reconciler.reconcile_at("X/-/Missing", NOW).await.unwrap_err();

    assert!(matches!(err, EngineError::TemplateNotFound(ref id) if id == "X/-/Missing"));
}

// =============================================================================
// Failure isolation
// =============================================================================

#[tokio::test]
async fn test_permanent_fault_isolated_to_one_pair() {
    let h = Harness::seeded(10);
    h.store.faults().arm(review_id(3), Fault::Permanent);

    let report = h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    assert_eq!(report.created.len(), 9);
    assert!(!report.created.contains(&review_id(3)));
    assert_eq!(report.failed.len(), 1);
    let failed = &report.failed[0];
    assert_eq!(failed.stage, FailureStage::Submission);
    assert_eq!(failed.child_id.as_deref(), Some(review_id(3).as_str()));
    assert_eq!(failed.anchor_id, "f3");
}

#[tokio::test]
async fn test_failed_update_does_not_end_existing_child() {
    let h = Harness::seeded(4);
    h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();
    h.store.put_template(
        review_template().with_content("review_readers", json!(["X/Program_Chairs"])),
    );
    h.store.faults().arm(review_id(3), Fault::Permanent);

    let report = h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    assert_eq!(report.updated.len(), 3);
    assert!(report.ended.is_empty());
    assert!(h.store.child(&review_id(3)).unwrap().is_live());
}

#[tokio::test]
async fn test_expansion_failure_keeps_existing_children() {
    let h = Harness::seeded(2);
    h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();
    h.store
        .put_template(review_template().with_pass_through("due", json!("Due {deadline}")));

    let report = h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    assert_eq!(report.failed.len(), 2);
    assert!(report.failed.iter().all(|f| f.stage == FailureStage::Expansion));
    assert!(report.ended.is_empty());
    assert!(h.store.child(&review_id(1)).unwrap().is_live());
    assert!(h.store.child(&review_id(2)).unwrap().is_live());
}

#[tokio::test]
async fn test_transient_fault_is_retried() {
    let h = Harness::seeded(1);
    h.store.faults().arm(review_id(1), Fault::Transient(2));

    let report = h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    assert_eq!(report.created, vec![review_id(1)]);
    assert!(report.is_clean());
    assert_eq!(h.store.write_count(), 1);
}

#[tokio::test]
async fn test_stalled_write_times_out() {
    let h = Harness::seeded(2);
    h.store
        .faults()
        .arm(review_id(2), Fault::Stall(Duration::from_secs(5)));

    let report = h.reconciler.reconcile_at(REVIEW, NOW).await.unwrap();

    assert_eq!(report.created, vec![review_id(1)]);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].error.contains("Timed out"));
    assert!(h.store.child(&review_id(2)).is_none());
}
