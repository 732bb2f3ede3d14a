//! Engine error taxonomy.
//!
//! Resolution errors abort a pass before any write. Expansion and submission
//! errors are scoped to one pair: they are logged, recorded in the pass
//! report and never abort sibling work.

use inviteflow_core::CoreError;
use inviteflow_storage::StorageError;
use thiserror::Error;

/// Failure to compute the set of (anchor, target) pairs.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Malformed source filter on {template_id}: {message}")]
    MalformedFilter { template_id: String, message: String },

    /// A reply that cannot be tied back to the forum that lists it.
    #[error("Reply {reply_id} does not resolve to forum {forum_id}: {message}")]
    DanglingReply {
        reply_id: String,
        forum_id: String,
        message: String,
    },

    #[error("Store query failed: {0}")]
    Store(#[from] StorageError),
}

/// Failure to expand the template for one pair.
#[derive(Debug, Error)]
pub enum ExpansionError {
    /// `noteReaders` is declared but neither reader list is configured.
    #[error("{template_id} declares noteReaders but has no review_readers or comment_readers")]
    MissingReaders { template_id: String },

    #[error("{template_id}: placeholder '{{{placeholder}}}' has no value")]
    UnresolvedPlaceholder {
        template_id: String,
        placeholder: String,
    },

    /// The anchor lacks an attribute a declared field needs.
    #[error("{template_id}: anchor {anchor_id} has no {attribute}")]
    MissingAttribute {
        template_id: String,
        anchor_id: String,
        attribute: &'static str,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// A store write that failed after its retry budget.
#[derive(Debug, Error)]
#[error("{operation} on {target} failed after {attempts} attempt(s): {source}")]
pub struct SubmissionError {
    pub operation: String,
    pub target: String,
    pub attempts: u32,
    #[source]
    pub source: StorageError,
}

impl SubmissionError {
    pub fn is_transient(&self) -> bool {
        self.source.is_transient()
    }
}

/// Errors returned by engine entry points.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// The id does not name a forum item.
    #[error("Forum not found: {0}")]
    ForumNotFound(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Expansion(#[from] ExpansionError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TemplateNotFound(_) => "template_not_found",
            Self::ForumNotFound(_) => "forum_not_found",
            Self::Resolution(_) => "resolution",
            Self::Expansion(_) => "expansion",
            Self::Submission(_) => "submission",
            Self::Storage(_) => "storage",
            Self::Core(_) => "core",
            Self::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
