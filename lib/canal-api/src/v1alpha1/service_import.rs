use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ServiceImport makes a Service exported by remote clusters available
/// locally through a derived ClusterIP Service of the same name
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "flomesh.io",
    version = "v1alpha1",
    kind = "ServiceImport",
    plural = "serviceimports",
    shortname = "simp",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    status = "ServiceImportStatus",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"IP","type":"string","jsonPath":".spec.ips"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceImportSpec {
    /// How the imported service is addressed
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<ServiceImportType>,

    /// Virtual IPs advertised for the imported service
    #[serde(default)]
    pub ips: Vec<String>,

    /// Ports of the imported service
    #[serde(default)]
    pub ports: Vec<ServicePort>,

    /// Session affinity, mirrored onto the derived Service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_affinity: Option<String>,

    /// Service account the imported workload runs as
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

/// Addressing mode of a ServiceImport
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ServiceImportType {
    /// A single virtual IP shared across the cluster set
    ClusterSetIP,
    /// No virtual IP; endpoints are addressed directly
    Headless,
}

/// Port of an imported service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// TCP, UDP or SCTP
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_protocol: Option<String>,

    pub port: i32,

    /// Remote endpoints backing this port
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// Remote endpoint of an imported port
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Key of the cluster the endpoint lives in
    pub cluster_key: String,

    pub target: Target,
}

/// Address of a remote endpoint
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Target {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    pub port: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Status of a ServiceImport
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ServiceImportStatus {
    /// Clusters currently exporting the service
    #[serde(default)]
    pub clusters: Vec<SourceStatus>,
}

/// One exporting cluster
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceStatus {
    pub cluster: String,
}

impl ServiceImportSpec {
    /// Import type with the API default applied
    pub fn effective_type(&self) -> ServiceImportType {
        self.type_.unwrap_or(ServiceImportType::ClusterSetIP)
    }
}
