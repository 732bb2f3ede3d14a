//! # inviteflow-engine
//!
//! Reconciles template invitations into one child invitation per matching
//! item and keeps records posted under those children visible to the right
//! readers.
//!
//! The engine is stateless between passes: it reads everything through a
//! [`inviteflow_storage::ReviewStore`] and every effect is a store call.
//!
//! ## Example
//!
//! ```ignore
//! use inviteflow_engine::{EngineConfig, Reconciler};
//!
//! let reconciler = Reconciler::new(store, EngineConfig::default());
//! let report = reconciler.reconcile("X/-/Official_Review").await?;
//! tracing::info!(created = report.created.len(), "done");
//! ```

pub mod config;
pub mod decision;
pub mod error;
pub mod expander;
pub mod observability;
pub mod propagator;
pub mod reconciler;
pub mod resolver;
pub mod retry;
pub mod supersede;

pub use config::EngineConfig;
pub use decision::{DecisionClassifier, DefaultClassifier};
pub use error::{EngineError, ExpansionError, ResolutionError, Result, SubmissionError};
pub use propagator::{PropagationReport, SkipReason};
pub use reconciler::{FailedPair, FailureStage, PassOutcome, PassReport, Reconciler};
pub use resolver::Pair;
pub use retry::RetryPolicy;
pub use supersede::SupersedeReport;
