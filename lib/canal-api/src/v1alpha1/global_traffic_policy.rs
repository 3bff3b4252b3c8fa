use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// GlobalTrafficPolicy declares how traffic to a Service of the same name
/// is distributed across the clusters that export it
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "flomesh.io",
    version = "v1alpha1",
    kind = "GlobalTrafficPolicy",
    plural = "globaltrafficpolicies",
    shortname = "gtp",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"LB Type","type":"string","jsonPath":".spec.lbType"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct GlobalTrafficPolicySpec {
    /// Distribution mode, defaulted to Locality
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lb_type: Option<LoadBalancerType>,

    /// Weighted cluster targets
    #[serde(default)]
    pub targets: Vec<TrafficTarget>,
}

/// Load distribution across clusters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum LoadBalancerType {
    /// Serve locally, or from the single listed cluster
    Locality,
    /// Spread across all targets by weight
    ActiveActive,
    /// Serve locally and fail over to the targets in order
    FailOver,
}

impl fmt::Display for LoadBalancerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadBalancerType::Locality => "Locality",
            LoadBalancerType::ActiveActive => "ActiveActive",
            LoadBalancerType::FailOver => "FailOver",
        };
        f.write_str(s)
    }
}

/// A cluster receiving a share of the traffic
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrafficTarget {
    /// Cluster key in `region/zone/group/cluster` form
    pub cluster_key: String,

    /// Relative weight; only meaningful for ActiveActive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}
