//! Classification of decision outcomes.

use inviteflow_core::VenueDomain;

/// Maps a decision value to accept (`true`) or reject (`false`).
pub trait DecisionClassifier: Send + Sync {
    fn is_accept(&self, decision: &str) -> bool;
}

/// Membership in the venue's accept options when configured, otherwise a
/// case-insensitive search for "accept".
#[derive(Debug, Clone, Default)]
pub struct DefaultClassifier {
    accept_options: Option<Vec<String>>,
}

impl DefaultClassifier {
    pub fn new(accept_options: Option<Vec<String>>) -> Self {
        Self { accept_options }
    }

    pub fn for_domain(domain: &VenueDomain) -> Self {
        Self::new(domain.accept_decision_options.clone())
    }
}

impl DecisionClassifier for DefaultClassifier {
    fn is_accept(&self, decision: &str) -> bool {
        match &self.accept_options {
            Some(options) if !options.is_empty() => options.iter().any(|o| o == decision),
            _ => decision.to_ascii_lowercase().contains("accept"),
        }
    }
}

impl<F> DecisionClassifier for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_accept(&self, decision: &str) -> bool {
        self(decision)
    }
}
