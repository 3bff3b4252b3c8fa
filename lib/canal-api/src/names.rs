//! Well-known resource names, annotations and labels

/// Secret holding the root CA in the controller namespace
pub const CA_BUNDLE_SECRET_NAME: &str = "flomesh-ca-bundle";
/// Root certificate key of a self-managed CA secret
pub const CA_CERT_KEY: &str = "ca.crt";
/// Root private key of a self-managed CA secret
pub const CA_KEY_KEY: &str = "ca.key";
/// Root certificate key of a cert-manager issued secret
pub const TLS_CERT_KEY: &str = "tls.crt";
/// Root private key of a cert-manager issued secret
pub const TLS_KEY_KEY: &str = "tls.key";

pub const MUTATING_WEBHOOK_CONFIGURATION_NAME: &str = "flomesh-mutating-webhook-configuration";
pub const VALIDATING_WEBHOOK_CONFIGURATION_NAME: &str = "flomesh-validating-webhook-configuration";
pub const WEBHOOK_SERVICE_NAME: &str = "erie-canal-webhook-service";

/// Hash of the last programmed ServiceExport spec
pub const EXPORT_HASH_ANNOTATION: &str = "multicluster.flomesh.io/export-hash";
/// Link from a ServiceImport to its derived Service
pub const DERIVED_SERVICE_ANNOTATION: &str = "multicluster.flomesh.io/derived-service";

/// Standard EndpointSlice owner label
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";
/// Original service name of an imported EndpointSlice
pub const MULTICLUSTER_SERVICE_NAME_LABEL: &str = "multicluster.kubernetes.io/service-name";

/// Prefix of ingresses generated from exports
pub const EXPORT_INGRESS_PREFIX: &str = "svcexp-ing-";
/// Ingress class served by the pipy ingress controller
pub const INGRESS_CLASS_NAME: &str = "pipy";

pub const INGRESS_REWRITE_FROM_ANNOTATION: &str = "pipy.ingress.kubernetes.io/rewrite-target-from";
pub const INGRESS_REWRITE_TO_ANNOTATION: &str = "pipy.ingress.kubernetes.io/rewrite-target-to";
pub const INGRESS_SESSION_STICKY_ANNOTATION: &str = "pipy.ingress.kubernetes.io/session-sticky";
pub const INGRESS_LOAD_BALANCER_ANNOTATION: &str = "pipy.ingress.kubernetes.io/lb-type";

/// ConfigMap carrying the mesh configuration
pub const MESH_CONFIG_NAME: &str = "flomesh-mesh-config";
/// Key of the mesh configuration document inside the ConfigMap
pub const MESH_CONFIG_KEY: &str = "mesh_config.json";

/// Name of the ingress generated for an export
pub fn export_ingress_name(export_name: &str) -> String {
    format!("{}{}", EXPORT_INGRESS_PREFIX, export_name)
}
