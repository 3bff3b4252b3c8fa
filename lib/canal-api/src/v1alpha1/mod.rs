/// API version v1alpha1 for Flomesh multi-cluster and ingress CRDs

pub mod cluster;
pub mod condition;
pub mod global_traffic_policy;
pub mod namespaced_ingress;
pub mod proxy_profile;
pub mod service_export;
pub mod service_import;

pub use cluster::{Cluster, ClusterKey};
pub use condition::{Condition, ConditionStatus};
pub use global_traffic_policy::{GlobalTrafficPolicy, LoadBalancerType};
pub use namespaced_ingress::NamespacedIngress;
pub use proxy_profile::ProxyProfile;
pub use service_export::ServiceExport;
pub use service_import::{ServiceImport, ServiceImportType};

/// API group for Flomesh resources
pub const API_GROUP: &str = "flomesh.io";
/// API version for Flomesh resources
pub const API_VERSION: &str = "v1alpha1";
