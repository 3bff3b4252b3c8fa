//! Helpers for status conditions keyed by type

use canal_api::{Condition, ConditionStatus};
use chrono::{SecondsFormat, Utc};

/// Reason recorded on successful reconciles
pub const REASON_SUCCESS: &str = "Success";
/// Reason recorded when input prevents a reconcile from completing
pub const REASON_FAILED: &str = "Failed";

/// A condition stamped with the current time
pub fn new_condition(
    type_: &str,
    status: ConditionStatus,
    observed_generation: i64,
    reason: &str,
    message: impl Into<String>,
) -> Condition {
    Condition {
        type_: type_.to_string(),
        status,
        observed_generation,
        last_transition_time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        reason: reason.to_string(),
        message: message.into(),
    }
}

/// Find the condition of a given type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Insert or update a condition, returning whether anything changed.
///
/// The transition time of an existing condition only moves when its status
/// flips; a reason, message or generation change keeps the old timestamp.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        None => {
            conditions.push(condition);
            true
        }
        Some(existing) => {
            let mut changed = false;
            if existing.status != condition.status {
                existing.status = condition.status;
                existing.last_transition_time = condition.last_transition_time;
                changed = true;
            }
            if existing.reason != condition.reason {
                existing.reason = condition.reason;
                changed = true;
            }
            if existing.message != condition.message {
                existing.message = condition.message;
                changed = true;
            }
            if existing.observed_generation != condition.observed_generation {
                existing.observed_generation = condition.observed_generation;
                changed = true;
            }
            changed
        }
    }
}
