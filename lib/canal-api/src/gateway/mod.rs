/// Bindings to the Gateway API CRDs (gateway.networking.k8s.io)
///
/// Only the fields the admission layer inspects are modelled; anything
/// else on the wire is ignored on read.

pub mod gateway;
pub mod gateway_class;
pub mod http_route;
pub mod reference_policy;
pub mod routes;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use gateway::Gateway;
pub use gateway_class::GatewayClass;
pub use http_route::HTTPRoute;
pub use reference_policy::ReferencePolicy;
pub use routes::{TCPRoute, TLSRoute, UDPRoute};

/// API group of the Gateway API
pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

/// Upper bound on parentRefs per route
pub const MAX_PARENT_REFS: usize = 32;

/// Reference from a route to the Gateway it attaches to
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

/// Reference from a route rule to a backend
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackendRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

impl BackendRef {
    /// Whether the backend is a core Service, the only kind requiring a port
    pub fn is_service(&self) -> bool {
        let core_group = self.group.as_deref().map_or(true, str::is_empty);
        let service_kind = self.kind.as_deref().map_or(true, |k| k == "Service");
        core_group && service_kind
    }
}
