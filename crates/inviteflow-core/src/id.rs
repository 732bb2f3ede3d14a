//! Invitation id handling.
//!
//! Invitation ids have the shape `{prefix}/-/{name}`. Child invitations are
//! addressed by splicing an anchor scope between the template's prefix and
//! its name, so the same (template, anchor) pair always maps to the same id.

use crate::error::{CoreError, Result};

/// Separator between an invitation's owner prefix and its name.
pub const INVITATION_SEPARATOR: &str = "/-/";

/// Returns the part of an invitation id before the last `/-/`.
pub fn invitation_prefix(invitation_id: &str) -> Option<&str> {
    invitation_id
        .rfind(INVITATION_SEPARATOR)
        .map(|idx| &invitation_id[..idx])
}

/// Returns the part of an invitation id after the last `/-/`.
pub fn invitation_name(invitation_id: &str) -> Option<&str> {
    invitation_id
        .rfind(INVITATION_SEPARATOR)
        .map(|idx| &invitation_id[idx + INVITATION_SEPARATOR.len()..])
}

/// Builds the id of the child invitation materialized for one anchor.
///
/// `scope` is the anchor's relative scope, e.g. `Paper7` for a submission or
/// `Paper7/Official_Review3` for a reply.
///
/// `tmpl/-/Review` + `Paper7` gives `tmpl/Paper7/-/Review`. Template ids
/// without a separator get the scope appended: `tmpl` + `Paper7` gives
/// `tmpl/Paper7`.
pub fn child_invitation_id(template_id: &str, scope: &str) -> Result<String> {
    if template_id.is_empty() {
        return Err(CoreError::invalid_id("template id must not be empty"));
    }
    if scope.is_empty() || scope.starts_with('/') || scope.ends_with('/') {
        return Err(CoreError::invalid_id(format!(
            "invalid anchor scope '{scope}' for {template_id}"
        )));
    }

    match (invitation_prefix(template_id), invitation_name(template_id)) {
        (Some(prefix), Some(name)) if !name.is_empty() => {
            Ok(format!("{prefix}/{scope}{INVITATION_SEPARATOR}{name}"))
        }
        _ => Ok(format!("{}/{scope}", template_id.trim_end_matches('/'))),
    }
}

/// Scope of a submission anchor: `{submission_name}{number}`.
pub fn submission_scope(submission_name: &str, number: u64) -> String {
    format!("{submission_name}{number}")
}

/// Scope of a reply anchor: the submission scope followed by the reply's
/// invitation name and number, e.g. `Paper7/Official_Review3`.
pub fn reply_scope(
    submission_name: &str,
    forum_number: u64,
    reply_invitation: &str,
    reply_number: u64,
) -> Result<String> {
    let name = invitation_name(reply_invitation)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            CoreError::invalid_id(format!("reply invitation '{reply_invitation}' has no name"))
        })?;
    Ok(format!(
        "{}/{name}{reply_number}",
        submission_scope(submission_name, forum_number)
    ))
}
