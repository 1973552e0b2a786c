//! Append-only condition-list discipline shared by Run, Workspace, and
//! `NamespaceDefaults` (§4.5 "Phase update discipline", §9 "Append-only
//! conditions").
//!
//! The condition list is an event log: existing entries are never mutated,
//! only appended to. An implementer may cap the list (the spec suggests 50
//! entries) but must not rewrite history; this module enforces that by only
//! ever pushing and, once the cap is exceeded, dropping from the front.

use chrono::Utc;

/// Oldest entries are dropped once the list exceeds this length (§9).
pub const MAX_CONDITIONS: usize = 50;

/// A condition type shared in shape (but not in Rust type) by
/// `RunCondition`, `WorkspaceCondition`, `ProviderCondition`, and
/// `NamespaceDefaultsCondition` — each CRD module owns its own struct
/// because they round-trip through distinct `status` subresources, but the
/// append discipline is identical.
pub trait Condition {
    fn build(condition_type: String, reason: String, message: Option<String>, now: String) -> Self;
}

/// Append a condition with `status=True`, `reason=<phase-or-event>`, and a
/// `lastTransitionTime` of now. Truncates from the front once the list
/// exceeds [`MAX_CONDITIONS`].
pub fn append<C: Condition>(conditions: &mut Vec<C>, condition_type: &str, reason: &str, message: Option<String>) {
    let now = Utc::now().to_rfc3339();
    conditions.push(C::build(
        condition_type.to_string(),
        reason.to_string(),
        message,
        now,
    ));
    if conditions.len() > MAX_CONDITIONS {
        let excess = conditions.len() - MAX_CONDITIONS;
        conditions.drain(0..excess);
    }
}

impl Condition for crate::crds::RunCondition {
    fn build(condition_type: String, reason: String, message: Option<String>, now: String) -> Self {
        Self {
            condition_type,
            status: "True".to_string(),
            last_transition_time: Some(now),
            reason: Some(reason),
            message,
        }
    }
}

impl Condition for crate::crds::WorkspaceCondition {
    fn build(condition_type: String, reason: String, message: Option<String>, now: String) -> Self {
        Self {
            condition_type,
            status: "True".to_string(),
            last_transition_time: Some(now),
            reason: Some(reason),
            message,
        }
    }
}

impl Condition for crate::crds::ProviderCondition {
    fn build(condition_type: String, reason: String, message: Option<String>, now: String) -> Self {
        Self {
            condition_type,
            status: "True".to_string(),
            last_transition_time: Some(now),
            reason: Some(reason),
            message,
        }
    }
}

impl Condition for crate::crds::namespace_defaults::NamespaceDefaultsCondition {
    fn build(condition_type: String, reason: String, message: Option<String>, now: String) -> Self {
        Self {
            condition_type,
            status: "True".to_string(),
            last_transition_time: Some(now),
            reason: Some(reason),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::RunCondition;

    #[test]
    fn append_never_mutates_existing_entries() {
        let mut conditions: Vec<RunCondition> = Vec::new();
        append(&mut conditions, "Pending", "Pending", None);
        let first = conditions[0].clone();
        append(&mut conditions, "Initializing", "Initializing", None);
        assert_eq!(conditions[0], first);
        assert_eq!(conditions.len(), 2);
    }

    #[test]
    fn caps_at_fifty_by_dropping_oldest() {
        let mut conditions: Vec<RunCondition> = Vec::new();
        for i in 0..60 {
            append(&mut conditions, &format!("Event{i}"), "Event", None);
        }
        assert_eq!(conditions.len(), MAX_CONDITIONS);
        assert_eq!(conditions.last().unwrap().condition_type, "Event59");
    }
}
