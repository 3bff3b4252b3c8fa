use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ReferencePolicy from the Gateway API - allows cross-namespace references
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1alpha2",
    kind = "ReferencePolicy",
    plural = "referencepolicies",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
)]
pub struct ReferencePolicySpec {
    /// Namespaces and kinds allowed to refer
    #[serde(default)]
    pub from: Vec<ReferencePolicyFrom>,

    /// Kinds that may be referred to
    #[serde(default)]
    pub to: Vec<ReferencePolicyTo>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReferencePolicyFrom {
    pub group: String,
    pub kind: String,
    pub namespace: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReferencePolicyTo {
    pub group: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
