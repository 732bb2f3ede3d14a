//! Template expansion: one concrete child spec per resolved pair.
//!
//! Expansion is pure. Declared field kinds are computed from the pair,
//! pass-through values have their `{placeholder}` references substituted,
//! and the template's record policy is specialized for the child.

use crate::error::ExpansionError;
use crate::resolver::Pair;
use inviteflow_core::id::{reply_scope, submission_scope};
use inviteflow_core::{
    ChildSpec, FieldKind, ReaderList, ReaderSpec, RecordPolicy, SELF_MARKER, Template,
    VenueDomain, child_invitation_id,
};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)?)\}")
        .expect("Invalid placeholder regex")
});

/// Marker in record policy lists replaced by the child's note readers.
pub const NOTE_READERS_MARKER: &str = "{noteReaders}";

const SELF_PLACEHOLDER: &str = "signatures";

/// Deterministic id of the child materialized for `pair`.
pub fn child_id(
    template: &Template,
    domain: &VenueDomain,
    pair: &Pair,
) -> Result<String, ExpansionError> {
    let scope = if pair.is_reply() {
        let invitation = pair
            .anchor
            .first_invitation()
            .ok_or_else(|| missing(template, pair, "invitation"))?;
        reply_scope(
            &domain.submission_name,
            pair.target.number,
            invitation,
            pair.anchor.number,
        )?
    } else {
        submission_scope(&domain.submission_name, pair.anchor.number)
    };
    Ok(child_invitation_id(&template.id, &scope)?)
}

/// Builds the child spec for one pair.
pub fn expand(
    template: &Template,
    domain: &VenueDomain,
    pair: &Pair,
) -> Result<ChildSpec, ExpansionError> {
    let anchor = &pair.anchor;
    let target = &pair.target;

    let needs_readers = template.fields.declares("noteReaders")
        || template
            .record_policy
            .as_ref()
            .is_some_and(mentions_note_readers);
    let readers = if needs_readers {
        Some(note_readers(template, domain, pair)?)
    } else {
        None
    };

    let mut content = BTreeMap::new();
    content.insert("noteId".to_string(), Value::from(target.id.clone()));
    content.insert("noteNumber".to_string(), Value::from(target.number));

    for (key, kind) in template.fields.iter() {
        let value = match kind {
            FieldKind::NoteId | FieldKind::NoteNumber => continue,
            FieldKind::ReplyTo => Value::from(anchor.id.clone()),
            FieldKind::ReplyNumber => Value::from(anchor.number),
            FieldKind::ReplyToSignatures => Value::from(
                anchor
                    .first_signature()
                    .ok_or_else(|| missing(template, pair, "signature"))?,
            ),
            FieldKind::ReplyToReplyToSignatures => {
                let Some(signature) = anchor
                    .replyto
                    .as_deref()
                    .and_then(|id| target.find_in_thread(id))
                    .and_then(|parent| parent.first_signature())
                else {
                    tracing::debug!(
                        template_id = %template.id,
                        anchor_id = %anchor.id,
                        "replyto target not in thread, omitting {key}"
                    );
                    continue;
                };
                Value::from(signature)
            }
            FieldKind::InvitationPrefix => {
                let invitation = anchor
                    .first_invitation()
                    .ok_or_else(|| missing(template, pair, "invitation"))?;
                Value::from(format!(
                    "{}{}",
                    invitation.replace(inviteflow_core::INVITATION_SEPARATOR, "/"),
                    anchor.number
                ))
            }
            FieldKind::NoteReaders => match &readers {
                Some(readers) => Value::from(readers.to_vec()),
                None => continue,
            },
            FieldKind::PassThrough(raw) => substitute_value(template, raw, &|name: &str| {
                pass_through_value(template, pair, name)
            })?,
        };
        content.insert(key.to_string(), value);
    }

    let record_policy = template
        .record_policy
        .as_ref()
        .map(|policy| expand_policy(template, policy, anchor.number, &content, readers.as_ref()))
        .transpose()?;

    Ok(ChildSpec {
        id: child_id(template, domain, pair)?,
        template_id: template.id.clone(),
        forum: target.id.clone(),
        anchor_id: anchor.id.clone(),
        content,
        record_policy,
    })
}

/// Reader list for records posted under the child of `pair`.
pub fn note_readers(
    template: &Template,
    domain: &VenueDomain,
    pair: &Pair,
) -> Result<ReaderList, ExpansionError> {
    let base = match template.content_list("review_readers")? {
        Some(list) if !list.is_empty() => list,
        _ => template
            .content_list("comment_readers")?
            .filter(|list| !list.is_empty())
            .ok_or_else(|| ExpansionError::MissingReaders {
                template_id: template.id.clone(),
            })?,
    };

    let number = pair.anchor.number.to_string();
    let mut readers: ReaderList = base
        .iter()
        .filter(|pattern| pattern.as_str() != SELF_MARKER)
        .map(|pattern| pattern.replace("{number}", &number))
        .collect();

    if pair.anchor.content_flag("flagged_for_ethics_review")
        && (!readers.is_public() || template.content_flag("reader_selection"))
    {
        if let Some(group) = domain.ethics_reviewers_group(pair.anchor.number) {
            readers.push(group);
        }
        if domain.release_submissions_to_ethics_chairs
            && let Some(chairs) = &domain.ethics_chairs_id
        {
            readers.push(chairs.clone());
        }
    }
    Ok(readers)
}

fn missing(template: &Template, pair: &Pair, attribute: &'static str) -> ExpansionError {
    ExpansionError::MissingAttribute {
        template_id: template.id.clone(),
        anchor_id: pair.anchor.id.clone(),
        attribute,
    }
}

fn mentions_note_readers(policy: &RecordPolicy) -> bool {
    let fixed = policy.readers.patterns().unwrap_or_default();
    fixed
        .iter()
        .chain(&policy.writers)
        .chain(policy.nonreaders.iter().flatten())
        .chain(policy.content_readers.values().flatten())
        .any(|entry| entry == NOTE_READERS_MARKER)
}

fn pass_through_value(template: &Template, pair: &Pair, name: &str) -> Option<Value> {
    match name {
        "number" => Some(Value::from(pair.anchor.number)),
        "id" => Some(Value::from(pair.anchor.id.clone())),
        "forum" => Some(Value::from(pair.target.id.clone())),
        _ => match name.strip_prefix("content.") {
            Some(key) => pair.target.content_value(key).cloned(),
            None => template.content.get(name).cloned(),
        },
    }
    .filter(|value| !value.is_null())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Substitutes every placeholder in `text`.
///
/// A string that is exactly one placeholder takes the looked-up value with
/// its JSON type; placeholders embedded in longer text must be scalars.
/// `{signatures}` is left in place for per-record resolution.
fn render(
    template: &Template,
    text: &str,
    lookup: &dyn Fn(&str) -> Option<Value>,
) -> Result<Value, ExpansionError> {
    let unresolved = |name: &str| ExpansionError::UnresolvedPlaceholder {
        template_id: template.id.clone(),
        placeholder: name.to_string(),
    };

    if let Some(caps) = PLACEHOLDER_REGEX.captures(text)
        && caps.get(0).is_some_and(|m| m.as_str() == text)
    {
        let name = &caps[1];
        if name == SELF_PLACEHOLDER {
            return Ok(Value::from(text));
        }
        return lookup(name).ok_or_else(|| unresolved(name));
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in PLACEHOLDER_REGEX.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        if name.as_str() == SELF_PLACEHOLDER {
            out.push_str(whole.as_str());
        } else {
            let value = lookup(name.as_str()).ok_or_else(|| unresolved(name.as_str()))?;
            out.push_str(&scalar_text(&value).ok_or_else(|| unresolved(name.as_str()))?);
        }
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(Value::from(out))
}

fn substitute_value(
    template: &Template,
    value: &Value,
    lookup: &dyn Fn(&str) -> Option<Value>,
) -> Result<Value, ExpansionError> {
    match value {
        Value::String(text) => render(template, text, lookup),
        Value::Array(items) => items
            .iter()
            .map(|item| substitute_value(template, item, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), substitute_value(template, v, lookup)?)))
            .collect::<Result<serde_json::Map<_, _>, ExpansionError>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn expand_policy(
    template: &Template,
    policy: &RecordPolicy,
    number: u64,
    content: &BTreeMap<String, Value>,
    note_readers: Option<&ReaderList>,
) -> Result<RecordPolicy, ExpansionError> {
    let lookup = |name: &str| -> Option<Value> {
        if name == "number" {
            return Some(Value::from(number));
        }
        content.get(name).filter(|v| !v.is_null()).cloned()
    };

    let expand_list = |patterns: &[String]| -> Result<Vec<String>, ExpansionError> {
        let mut out = ReaderList::new();
        for pattern in patterns {
            if pattern == NOTE_READERS_MARKER {
                if let Some(readers) = note_readers {
                    out.extend(readers.iter());
                }
                continue;
            }
            let rendered = render(template, pattern, &lookup)?;
            let text = scalar_text(&rendered).ok_or_else(|| {
                ExpansionError::UnresolvedPlaceholder {
                    template_id: template.id.clone(),
                    placeholder: pattern.trim_matches(['{', '}']).to_string(),
                }
            })?;
            out.push(text);
        }
        Ok(out.into())
    };

    let readers = match &policy.readers {
        ReaderSpec::Fixed(patterns) => ReaderSpec::Fixed(expand_list(patterns)?),
        param @ ReaderSpec::Param { .. } => param.clone(),
    };
    let content_readers = policy
        .content_readers
        .iter()
        .map(|(key, patterns)| Ok((key.clone(), expand_list(patterns)?)))
        .collect::<Result<BTreeMap<_, _>, ExpansionError>>()?;

    Ok(RecordPolicy {
        readers,
        writers: expand_list(&policy.writers)?,
        nonreaders: policy
            .nonreaders
            .as_deref()
            .map(expand_list)
            .transpose()?,
        content_readers,
    })
}
