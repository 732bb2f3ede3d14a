use serde::{Deserialize, Serialize};

/// Venue-level configuration shared by every template of one venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueDomain {
    pub venue_id: String,
    pub submission_venue_id: String,
    pub rejected_venue_id: String,
    /// Meta invitation used to sign engine-issued edits and to end children.
    pub meta_invitation_id: String,
    #[serde(default = "default_submission_name")]
    pub submission_name: String,
    #[serde(default = "default_decision_name")]
    pub decision_name: String,
    #[serde(default = "default_decision_field_name")]
    pub decision_field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_decision_options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ethics_chairs_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ethics_reviewers_name: Option<String>,
    #[serde(default)]
    pub release_submissions_to_ethics_chairs: bool,
}

fn default_submission_name() -> String {
    "Submission".into()
}
fn default_decision_name() -> String {
    "Decision".into()
}
fn default_decision_field_name() -> String {
    "decision".into()
}

impl VenueDomain {
    /// Creates a domain with the conventional collection and meta ids.
    pub fn new(venue_id: impl Into<String>) -> Self {
        let venue_id = venue_id.into();
        Self {
            submission_venue_id: format!("{venue_id}/Submission"),
            rejected_venue_id: format!("{venue_id}/Rejected_Submission"),
            meta_invitation_id: format!("{venue_id}/-/Edit"),
            venue_id,
            submission_name: default_submission_name(),
            decision_name: default_decision_name(),
            decision_field_name: default_decision_field_name(),
            accept_decision_options: None,
            ethics_chairs_id: None,
            ethics_reviewers_name: None,
            release_submissions_to_ethics_chairs: false,
        }
    }

    pub fn with_submission_name(mut self, name: impl Into<String>) -> Self {
        self.submission_name = name.into();
        self
    }

    pub fn with_submission_venue(mut self, venue_id: impl Into<String>) -> Self {
        self.submission_venue_id = venue_id.into();
        self
    }

    /// `{venue}/{submission_name}{number}`, the paper group prefix.
    pub fn paper_group(&self, number: u64) -> String {
        format!("{}/{}{}", self.venue_id, self.submission_name, number)
    }

    /// Invitation under which decisions for paper `number` are posted.
    pub fn decision_invitation(&self, number: u64) -> String {
        format!("{}/-/{}", self.paper_group(number), self.decision_name)
    }

    /// Ethics reviewer group for paper `number`, when the venue has one.
    pub fn ethics_reviewers_group(&self, number: u64) -> Option<String> {
        self.ethics_reviewers_name
            .as_ref()
            .map(|name| format!("{}/{name}", self.paper_group(number)))
    }
}
