use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a condition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Condition records one observed aspect of a resource's state.
///
/// Conditions are keyed by `type`: a status holds at most one condition
/// of each type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition, e.g. `ServiceExportValid`
    #[serde(rename = "type")]
    pub type_: String,

    /// Status: "True", "False", "Unknown"
    pub status: ConditionStatus,

    /// Generation of the resource this condition was computed from
    #[serde(default)]
    pub observed_generation: i64,

    /// Last time the status flipped, RFC 3339
    pub last_transition_time: String,

    /// Machine-readable reason in CamelCase
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,
}
