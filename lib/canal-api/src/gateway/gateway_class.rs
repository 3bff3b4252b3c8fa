use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// GatewayClass names the controller responsible for a family of Gateways
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1beta1",
    kind = "GatewayClass",
    plural = "gatewayclasses",
    derive = "Default",
    derive = "PartialEq",
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayClassSpec {
    /// Controller managing Gateways of this class; immutable
    pub controller_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
