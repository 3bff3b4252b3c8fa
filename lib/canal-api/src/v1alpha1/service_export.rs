use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Condition;

/// Condition type reporting whether an export could be programmed
pub const CONDITION_SERVICE_EXPORT_VALID: &str = "ServiceExportValid";

/// ServiceExport declares that a local Service is exposed to the rest of
/// the cluster set, reachable through a generated ingress
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "flomesh.io",
    version = "v1alpha1",
    kind = "ServiceExport",
    plural = "serviceexports",
    shortname = "sexp",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    status = "ServiceExportStatus",
    printcolumn = r#"{"name":"Valid","type":"string","jsonPath":".status.conditions[?(@.type==\"ServiceExportValid\")].status"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceExportSpec {
    /// Routing rules; each becomes one HTTP path of the generated ingress
    #[serde(default)]
    pub rules: Vec<ServiceExportRule>,

    /// Optional path rewrite applied by the ingress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_rewrite: Option<PathRewrite>,

    /// Pin clients to the same upstream
    #[serde(default)]
    pub session_sticky: bool,

    /// Load-balancing algorithm used by the ingress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancerAlgorithm>,

    /// Clusters the service is exported to, as cluster keys. Empty means all.
    #[serde(default)]
    pub target_clusters: Vec<String>,

    /// Service account the exported workload runs as
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

/// One exported path
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceExportRule {
    /// Port of the exported Service
    pub port_number: i32,

    /// Literal HTTP path
    pub path: String,

    /// How `path` is matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_type: Option<PathType>,
}

/// Ingress path matching semantics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum PathType {
    Exact,
    Prefix,
    ImplementationSpecific,
}

impl PathType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathType::Exact => "Exact",
            PathType::Prefix => "Prefix",
            PathType::ImplementationSpecific => "ImplementationSpecific",
        }
    }
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rewrite of the request path prefix
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PathRewrite {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

/// Load balancer algorithm
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum LoadBalancerAlgorithm {
    RoundRobinLoadBalancer,
    HashingLoadBalancer,
    LeastWorkLoadBalancer,
}

impl LoadBalancerAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalancerAlgorithm::RoundRobinLoadBalancer => "RoundRobinLoadBalancer",
            LoadBalancerAlgorithm::HashingLoadBalancer => "HashingLoadBalancer",
            LoadBalancerAlgorithm::LeastWorkLoadBalancer => "LeastWorkLoadBalancer",
        }
    }
}

/// Status of a ServiceExport
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceExportStatus {
    /// Conditions keyed by type
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ServiceExportRule {
    /// Path type with the ingress default applied
    pub fn effective_path_type(&self) -> PathType {
        self.path_type.unwrap_or(PathType::Prefix)
    }
}
