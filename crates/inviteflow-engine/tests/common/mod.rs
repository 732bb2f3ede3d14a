//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use inviteflow_core::{Item, SourceFilter, Template, Timestamp, VenueDomain};
use inviteflow_db_memory::InMemoryStore;
use inviteflow_engine::config::{ConcurrencyConfig, LoggingConfig, RetryConfig};
use inviteflow_engine::{EngineConfig, Reconciler};
use serde_json::json;

pub const VENUE: &str = "X";
pub const REVIEW: &str = "X/-/Official_Review";
pub const META: &str = "X/-/Edit";

/// Any instant after every fixture template's activation date.
pub const NOW: Timestamp = Timestamp::from_millis(1_700_000_000_000);

pub fn review_id(number: u64) -> String {
    format!("X/Submission{number}/-/Official_Review")
}

/// Retry budget small enough to keep fault tests fast.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        concurrency: ConcurrencyConfig { max_in_flight: 4 },
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            call_timeout_ms: 200,
        },
        logging: LoggingConfig::default(),
    }
}

pub fn domain() -> VenueDomain {
    VenueDomain::new(VENUE)
}

pub fn submission(number: u64) -> Item {
    Item::new(format!("f{number}"), number)
        .with_content("venueid", "X/Submission")
        .with_content("title", format!("Paper {number}"))
        .with_readers(["X".to_string(), format!("X/Submission{number}/Authors")])
        .with_signatures([format!("X/Submission{number}/Authors")])
        .with_invitation("X/-/Submission")
}

/// Review template scoped to every submission of the venue.
pub fn review_template() -> Template {
    Template::new(REVIEW, VENUE, Timestamp::from_millis(0))
        .with_source(SourceFilter::new().with_venue("X/Submission"))
        .with_field("noteReaders")
        .with_pass_through("title", json!("Review of {content.title}"))
        .with_content(
            "review_readers",
            json!(["X/Program_Chairs", "X/Submission{number}/Reviewers"]),
        )
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        store.put_domain(domain());
        let reconciler = Reconciler::new(store.clone(), config);
        Self { store, reconciler }
    }

    /// Seeds the review template and submissions `1..=count`.
    pub fn seeded(count: u64) -> Self {
        let harness = Self::new();
        harness.store.put_template(review_template());
        for number in 1..=count {
            harness.store.put_item(submission(number));
        }
        harness
    }
}
