//! Defaulters and validators for every admitted kind

mod cluster;
mod config_map;
mod gateway;
mod global_traffic_policy;
mod namespaced_ingress;
mod proxy_profile;
mod service_export;
mod service_import;

pub use cluster::ClusterHook;
pub use config_map::ConfigMapHook;
pub use gateway::{
    GatewayClassHook, GatewayHook, HTTPRouteHook, ReferencePolicyHook, TCPRouteHook, TLSRouteHook,
    UDPRouteHook,
};
pub use global_traffic_policy::GlobalTrafficPolicyHook;
pub use namespaced_ingress::NamespacedIngressHook;
pub use proxy_profile::ProxyProfileHook;
pub use service_export::ServiceExportHook;
pub use service_import::ServiceImportHook;

use canal_api::ClusterKey;

use crate::hook::ValidationErrors;
use crate::registry::HookRegistry;

/// Registry holding a hook for every admitted kind
pub fn default_registry(mesh_config_name: &str) -> HookRegistry {
    HookRegistry::new()
        .register(GatewayHook)
        .register(GatewayClassHook)
        .register(HTTPRouteHook)
        .register(TCPRouteHook)
        .register(TLSRouteHook)
        .register(UDPRouteHook)
        .register(ReferencePolicyHook)
        .register(ServiceExportHook)
        .register(ServiceImportHook)
        .register(GlobalTrafficPolicyHook)
        .register(ConfigMapHook::new(mesh_config_name))
        .register(ClusterHook)
        .register(ProxyProfileHook)
        .register(NamespacedIngressHook)
}

pub(crate) fn check_port(errors: &mut ValidationErrors, field: impl Into<String>, port: i32) {
    if !(1..=65535).contains(&port) {
        errors.push(field, format!("{} is not a valid port, must be 1-65535", port));
    }
}

pub(crate) fn check_cluster_key(errors: &mut ValidationErrors, field: impl Into<String>, key: &str) {
    if let Err(e) = key.parse::<ClusterKey>() {
        errors.push(field, e.to_string());
    }
}

/// Absolute HTTP path without whitespace
pub(crate) fn check_http_path(errors: &mut ValidationErrors, field: impl Into<String>, path: &str) {
    if !path.starts_with('/') {
        errors.push(field, format!("path {:?} must start with '/'", path));
    } else if path.chars().any(char::is_whitespace) {
        errors.push(field, format!("path {:?} must not contain whitespace", path));
    }
}

/// RFC 1123 DNS label
pub(crate) fn is_dns_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

/// RFC 1123 subdomain, optionally with a leading `*.` wildcard label
pub(crate) fn is_hostname(s: &str, allow_wildcard: bool) -> bool {
    let rest = match s.strip_prefix("*.") {
        Some(rest) if allow_wildcard => rest,
        Some(_) => return false,
        None => s,
    };
    s.len() <= 253 && !rest.is_empty() && rest.split('.').all(is_dns_label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_rules() {
        assert!(is_hostname("foo.example.com", false));
        assert!(is_hostname("*.example.com", true));
        assert!(!is_hostname("*.example.com", false));
        assert!(!is_hostname("foo.*.com", true));
        assert!(!is_hostname("Foo.com", false));
        assert!(!is_hostname("", false));
    }

    #[test]
    fn test_check_http_path() {
        let mut errors = ValidationErrors::new();
        check_http_path(&mut errors, "a", "/ok");
        assert!(errors.is_empty());
        check_http_path(&mut errors, "b", "relative");
        check_http_path(&mut errors, "c", "/with space");
        assert!(errors.has_field("b"));
        assert!(errors.has_field("c"));
    }

    #[test]
    fn test_default_registry_covers_every_kind() {
        let registry = default_registry("flomesh-mesh-config");
        let kinds: Vec<String> = registry.descriptors().iter().map(|d| d.kind.clone()).collect();
        for kind in [
            "Gateway",
            "GatewayClass",
            "HTTPRoute",
            "TCPRoute",
            "TLSRoute",
            "UDPRoute",
            "ReferencePolicy",
            "ServiceExport",
            "ServiceImport",
            "GlobalTrafficPolicy",
            "ConfigMap",
            "Cluster",
            "ProxyProfile",
            "NamespacedIngress",
        ] {
            assert!(kinds.iter().any(|k| k == kind), "missing hook for {}", kind);
        }
    }
}
