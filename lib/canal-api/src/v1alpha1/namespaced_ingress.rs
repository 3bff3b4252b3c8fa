use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// NamespacedIngress runs a dedicated ingress controller for one namespace
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "flomesh.io",
    version = "v1alpha1",
    kind = "NamespacedIngress",
    plural = "namespacedingresses",
    shortname = "nsig",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedIngressSpec {
    /// Type of the Service exposing the ingress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,

    /// Plain HTTP listener
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpListener>,

    /// TLS listener
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsListener>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Proxy log verbosity, 1 to 5
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpListener {
    #[serde(default)]
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_port: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsListener {
    #[serde(default)]
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_port: Option<i32>,

    /// Require client certificates
    #[serde(default)]
    pub mtls: bool,

    /// Secret holding the serving certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}
