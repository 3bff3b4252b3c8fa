use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ProxyProfile describes the sidecar proxies injected into selected pods
/// and where their scripts come from
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "flomesh.io",
    version = "v1alpha1",
    kind = "ProxyProfile",
    plural = "proxyprofiles",
    shortname = "pf",
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Namespace","type":"string","jsonPath":".spec.namespace"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct ProxyProfileSpec {
    /// Pods this profile applies to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,

    /// Restrict the profile to one namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Scripts served from a ConfigMap, keyed by file name
    #[serde(default)]
    pub config: BTreeMap<String, String>,

    /// Base URL of the pipy repo the scripts are fetched from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_base_url: Option<String>,

    /// Codebase this profile derives from in the repo
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_codebase_path: Option<String>,

    /// Sidecar containers to inject
    #[serde(default)]
    pub sidecars: Vec<Sidecar>,

    /// When to restart pods after the profile changes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,

    /// Which pods are restarted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_scope: Option<RestartScope>,

    /// Environment added to every sidecar
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

/// Equality-based label selector
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

/// Sidecar container
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Sidecar {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Script the proxy starts from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_script_name: Option<String>,

    #[serde(default)]
    pub env: Vec<EnvVar>,
}

/// Environment variable
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RestartPolicy {
    Never,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RestartScope {
    Pod,
    Owner,
    None,
}
