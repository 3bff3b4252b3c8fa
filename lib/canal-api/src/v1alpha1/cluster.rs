use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Cluster registers a member of the cluster set with the control plane
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "flomesh.io",
    version = "v1alpha1",
    kind = "Cluster",
    plural = "clusters",
    derive = "Default",
    derive = "PartialEq",
    status = "ClusterStatus",
    printcolumn = r#"{"name":"Region","type":"string","jsonPath":".spec.region"}"#,
    printcolumn = r#"{"name":"Zone","type":"string","jsonPath":".spec.zone"}"#,
    printcolumn = r#"{"name":"Group","type":"string","jsonPath":".spec.group"}"#,
    printcolumn = r#"{"name":"Gateway Host","type":"string","jsonPath":".spec.gatewayHost"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Address of the cluster's ingress gateway, IP or DNS name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_host: Option<String>,

    /// Port of the cluster's ingress gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_port: Option<i32>,

    /// Kubeconfig used to reach the cluster's API server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,

    /// Namespace of the control plane inside the member cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane_namespace: Option<String>,
}

/// Status of a Cluster
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterStatus {
    #[serde(default)]
    pub conditions: Vec<super::Condition>,
}

/// Default value for unset cluster key segments
pub const DEFAULT_KEY_SEGMENT: &str = "default";

/// Hierarchical cluster identifier, `region/zone/group/cluster`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterKey {
    pub region: String,
    pub zone: String,
    pub group: String,
    pub cluster: String,
}

/// Error parsing a cluster key
#[derive(Error, Debug, PartialEq)]
pub enum ClusterKeyError {
    #[error("cluster key {0:?} must have exactly 4 segments region/zone/group/cluster")]
    SegmentCount(String),

    #[error("cluster key {0:?} has an empty segment")]
    EmptySegment(String),
}

impl ClusterKey {
    pub fn new(
        region: impl Into<String>,
        zone: impl Into<String>,
        group: impl Into<String>,
        cluster: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            zone: zone.into(),
            group: group.into(),
            cluster: cluster.into(),
        }
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.region, self.zone, self.group, self.cluster)
    }
}

impl FromStr for ClusterKey {
    type Err = ClusterKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 4 {
            return Err(ClusterKeyError::SegmentCount(s.to_string()));
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ClusterKeyError::EmptySegment(s.to_string()));
        }
        Ok(ClusterKey::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl Cluster {
    /// Key of this cluster, with unset segments reading as "default"
    pub fn key(&self) -> ClusterKey {
        let segment = |v: &Option<String>| {
            v.clone().unwrap_or_else(|| DEFAULT_KEY_SEGMENT.to_string())
        };
        ClusterKey {
            region: segment(&self.spec.region),
            zone: segment(&self.spec.zone),
            group: segment(&self.spec.group),
            cluster: self.metadata.name.clone().unwrap_or_default(),
        }
    }
}
