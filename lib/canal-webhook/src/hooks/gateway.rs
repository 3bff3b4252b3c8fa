//! Gateway API kinds

use std::collections::HashSet;
use std::net::IpAddr;

use canal_api::gateway::gateway::{GatewaySpec, Listener};
use canal_api::gateway::http_route::{HTTPPathMatch, HTTPRouteMatch};
use canal_api::gateway::routes::L4RouteRule;
use canal_api::gateway::{
    BackendRef, Gateway, GatewayClass, HTTPRoute, ParentReference, ReferencePolicy, TCPRoute,
    TLSRoute, UDPRoute, MAX_PARENT_REFS,
};

use super::{check_http_path, check_port, is_hostname};
use crate::hook::{AdmissionHook, ValidationErrors};

const LISTENER_PROTOCOLS: [&str; 5] = ["HTTP", "HTTPS", "TLS", "TCP", "UDP"];
const TLS_MODES: [&str; 2] = ["Terminate", "Passthrough"];
const PATH_MATCH_TYPES: [&str; 3] = ["Exact", "PathPrefix", "RegularExpression"];
const HTTP_FILTER_TYPES: [&str; 5] = [
    "RequestHeaderModifier",
    "RequestMirror",
    "RequestRedirect",
    "URLRewrite",
    "ExtensionRef",
];

pub struct GatewayHook;

impl AdmissionHook for GatewayHook {
    type Object = Gateway;

    fn set_defaults(&self, gateway: &mut Gateway) {
        for listener in &mut gateway.spec.listeners {
            if let Some(tls) = listener.tls.as_mut() {
                if tls.mode.is_none() {
                    tls.mode = Some("Terminate".to_string());
                }
            }
        }
    }

    fn validate_create(&self, gateway: &Gateway) -> Result<(), ValidationErrors> {
        validate_gateway(&gateway.spec)
    }

    fn validate_update(&self, _old: &Gateway, gateway: &Gateway) -> Result<(), ValidationErrors> {
        validate_gateway(&gateway.spec)
    }
}

fn validate_gateway(spec: &GatewaySpec) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if spec.gateway_class_name.is_empty() {
        errors.push("spec.gatewayClassName", "gateway class name is required");
    }
    if spec.listeners.is_empty() {
        errors.push("spec.listeners", "at least one listener is required");
    }

    let mut names = HashSet::new();
    for (i, listener) in spec.listeners.iter().enumerate() {
        let field = format!("spec.listeners[{}]", i);
        if !names.insert(listener.name.as_str()) {
            errors.push(format!("{}.name", field), format!("duplicate listener name {:?}", listener.name));
        }
        check_port(&mut errors, format!("{}.port", field), listener.port);
        check_listener(&mut errors, &field, listener);
    }

    errors.into_result()
}

fn check_listener(errors: &mut ValidationErrors, field: &str, listener: &Listener) {
    let protocol = listener.protocol.as_str();
    if !LISTENER_PROTOCOLS.contains(&protocol) {
        errors.push(format!("{}.protocol", field), format!("unsupported protocol {:?}", protocol));
        return;
    }

    match (protocol, &listener.tls) {
        ("HTTPS" | "TLS", None) => {
            errors.push(format!("{}.tls", field), format!("tls must be set for protocol {}", protocol));
        }
        ("HTTP" | "TCP" | "UDP", Some(_)) => {
            errors.push(format!("{}.tls", field), format!("tls must not be set for protocol {}", protocol));
        }
        (_, Some(tls)) => {
            let mode = tls.mode.as_deref().unwrap_or("Terminate");
            if !TLS_MODES.contains(&mode) {
                errors.push(format!("{}.tls.mode", field), format!("unsupported TLS mode {:?}", mode));
            } else if mode == "Terminate" && tls.certificate_refs.is_empty() {
                errors.push(
                    format!("{}.tls.certificateRefs", field),
                    "certificateRefs must be set when TLS is terminated",
                );
            } else if protocol == "HTTPS" && mode == "Passthrough" {
                errors.push(format!("{}.tls.mode", field), "HTTPS listeners cannot pass TLS through");
            }
        }
        _ => {}
    }

    if let Some(hostname) = listener.hostname.as_deref() {
        if matches!(protocol, "TCP" | "UDP") {
            errors.push(format!("{}.hostname", field), format!("hostname is not allowed for protocol {}", protocol));
        } else if !is_hostname(hostname, true) {
            errors.push(format!("{}.hostname", field), format!("{:?} is not a valid hostname", hostname));
        }
    }
}

pub struct GatewayClassHook;

impl AdmissionHook for GatewayClassHook {
    type Object = GatewayClass;

    fn validate_create(&self, class: &GatewayClass) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if class.spec.controller_name.is_empty() {
            errors.push("spec.controllerName", "controller name is required");
        }
        errors.into_result()
    }

    fn validate_update(&self, old: &GatewayClass, class: &GatewayClass) -> Result<(), ValidationErrors> {
        let mut errors = self.validate_create(class).err().unwrap_or_default();
        if old.spec.controller_name != class.spec.controller_name {
            errors.push("spec.controllerName", "controller name is immutable");
        }
        errors.into_result()
    }
}

fn check_parent_refs(errors: &mut ValidationErrors, parent_refs: &[ParentReference]) {
    if parent_refs.len() > MAX_PARENT_REFS {
        errors.push(
            "spec.parentRefs",
            format!("at most {} parentRefs are allowed, got {}", MAX_PARENT_REFS, parent_refs.len()),
        );
    }
    let mut seen = HashSet::new();
    for (i, parent) in parent_refs.iter().enumerate() {
        let key = (
            parent.namespace.as_deref(),
            parent.name.as_str(),
            parent.section_name.as_deref(),
            parent.port,
        );
        if !seen.insert(key) {
            errors.push(format!("spec.parentRefs[{}]", i), format!("duplicate parentRef {:?}", parent.name));
        }
        if let Some(port) = parent.port {
            check_port(errors, format!("spec.parentRefs[{}].port", i), port);
        }
    }
}

fn check_backend_refs(errors: &mut ValidationErrors, field: &str, backend_refs: &[BackendRef]) {
    for (i, backend) in backend_refs.iter().enumerate() {
        let field = format!("{}.backendRefs[{}]", field, i);
        match backend.port {
            Some(port) => check_port(errors, format!("{}.port", field), port),
            None if backend.is_service() => {
                errors.push(format!("{}.port", field), "port is required for a Service backend")
            }
            None => {}
        }
        if let Some(weight) = backend.weight {
            if !(0..=1_000_000).contains(&weight) {
                errors.push(format!("{}.weight", field), format!("weight {} must be 0-1000000", weight));
            }
        }
    }
}

fn default_path_match() -> HTTPPathMatch {
    HTTPPathMatch {
        type_: Some("PathPrefix".to_string()),
        value: Some("/".to_string()),
    }
}

pub struct HTTPRouteHook;

impl AdmissionHook for HTTPRouteHook {
    type Object = HTTPRoute;

    fn set_defaults(&self, route: &mut HTTPRoute) {
        for rule in &mut route.spec.rules {
            if rule.matches.is_empty() {
                rule.matches.push(HTTPRouteMatch {
                    path: Some(default_path_match()),
                });
            }
            for m in &mut rule.matches {
                let path = m.path.get_or_insert_with(default_path_match);
                if path.type_.is_none() {
                    path.type_ = Some("PathPrefix".to_string());
                }
                if path.value.is_none() {
                    path.value = Some("/".to_string());
                }
            }
        }
    }

    fn validate_create(&self, route: &HTTPRoute) -> Result<(), ValidationErrors> {
        validate_http_route(route)
    }

    fn validate_update(&self, _old: &HTTPRoute, route: &HTTPRoute) -> Result<(), ValidationErrors> {
        validate_http_route(route)
    }
}

fn validate_http_route(route: &HTTPRoute) -> Result<(), ValidationErrors> {
    let spec = &route.spec;
    let mut errors = ValidationErrors::new();
    check_parent_refs(&mut errors, &spec.parent_refs);

    for (i, hostname) in spec.hostnames.iter().enumerate() {
        if !is_hostname(hostname, true) {
            errors.push(format!("spec.hostnames[{}]", i), format!("{:?} is not a valid hostname", hostname));
        }
    }

    for (i, rule) in spec.rules.iter().enumerate() {
        let field = format!("spec.rules[{}]", i);
        for (j, m) in rule.matches.iter().enumerate() {
            let Some(path) = &m.path else { continue };
            let field = format!("{}.matches[{}].path", field, j);
            let path_type = path.type_.as_deref().unwrap_or("PathPrefix");
            if !PATH_MATCH_TYPES.contains(&path_type) {
                errors.push(format!("{}.type", field), format!("unsupported path match type {:?}", path_type));
                continue;
            }
            let value = path.value.as_deref().unwrap_or("/");
            match path_type {
                "RegularExpression" => {
                    if value.is_empty() {
                        errors.push(format!("{}.value", field), "regular expression must not be empty");
                    }
                }
                _ => {
                    check_http_path(&mut errors, format!("{}.value", field), value);
                    if path_type == "PathPrefix" && value.len() > 1 && value.ends_with('/') {
                        errors.push(format!("{}.value", field), "a path prefix must not end with '/'");
                    }
                    if value.contains("//") || value.split('/').any(|s| s == ".." || s == ".") {
                        errors.push(format!("{}.value", field), "path must be normalized");
                    }
                }
            }
        }

        let mut filter_types = HashSet::new();
        for (j, filter) in rule.filters.iter().enumerate() {
            let field = format!("{}.filters[{}].type", field, j);
            if !HTTP_FILTER_TYPES.contains(&filter.type_.as_str()) {
                errors.push(field, format!("unsupported filter type {:?}", filter.type_));
            } else if filter.type_ != "RequestMirror"
                && filter.type_ != "ExtensionRef"
                && !filter_types.insert(filter.type_.as_str())
            {
                errors.push(field, format!("filter {} may appear at most once per rule", filter.type_));
            }
        }
        if filter_types.contains("RequestRedirect") && filter_types.contains("URLRewrite") {
            errors.push(format!("{}.filters", field), "RequestRedirect and URLRewrite cannot be combined");
        }

        check_backend_refs(&mut errors, &field, &rule.backend_refs);
    }

    errors.into_result()
}

fn validate_l4_route(parent_refs: &[ParentReference], rules: &[L4RouteRule]) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    check_parent_refs(&mut errors, parent_refs);
    if rules.is_empty() {
        errors.push("spec.rules", "at least one rule is required");
    }
    for (i, rule) in rules.iter().enumerate() {
        let field = format!("spec.rules[{}]", i);
        if rule.backend_refs.is_empty() {
            errors.push(format!("{}.backendRefs", field), "at least one backendRef is required");
        }
        check_backend_refs(&mut errors, &field, &rule.backend_refs);
    }
    errors
}

pub struct TCPRouteHook;

impl AdmissionHook for TCPRouteHook {
    type Object = TCPRoute;

    fn validate_create(&self, route: &TCPRoute) -> Result<(), ValidationErrors> {
        validate_l4_route(&route.spec.parent_refs, &route.spec.rules).into_result()
    }

    fn validate_update(&self, _old: &TCPRoute, route: &TCPRoute) -> Result<(), ValidationErrors> {
        self.validate_create(route)
    }
}

pub struct UDPRouteHook;

impl AdmissionHook for UDPRouteHook {
    type Object = UDPRoute;

    fn validate_create(&self, route: &UDPRoute) -> Result<(), ValidationErrors> {
        validate_l4_route(&route.spec.parent_refs, &route.spec.rules).into_result()
    }

    fn validate_update(&self, _old: &UDPRoute, route: &UDPRoute) -> Result<(), ValidationErrors> {
        self.validate_create(route)
    }
}

pub struct TLSRouteHook;

impl AdmissionHook for TLSRouteHook {
    type Object = TLSRoute;

    fn validate_create(&self, route: &TLSRoute) -> Result<(), ValidationErrors> {
        let mut errors = validate_l4_route(&route.spec.parent_refs, &route.spec.rules);
        for (i, hostname) in route.spec.hostnames.iter().enumerate() {
            let field = format!("spec.hostnames[{}]", i);
            if hostname.parse::<IpAddr>().is_ok() {
                errors.push(field, format!("{:?} is an IP address, SNI requires a host name", hostname));
            } else if !is_hostname(hostname, true) {
                errors.push(field, format!("{:?} is not a valid hostname", hostname));
            }
        }
        errors.into_result()
    }

    fn validate_update(&self, _old: &TLSRoute, route: &TLSRoute) -> Result<(), ValidationErrors> {
        self.validate_create(route)
    }
}

pub struct ReferencePolicyHook;

impl AdmissionHook for ReferencePolicyHook {
    type Object = ReferencePolicy;

    fn validate_create(&self, policy: &ReferencePolicy) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if policy.spec.from.is_empty() {
            errors.push("spec.from", "at least one from entry is required");
        }
        if policy.spec.to.is_empty() {
            errors.push("spec.to", "at least one to entry is required");
        }
        for (i, from) in policy.spec.from.iter().enumerate() {
            if from.kind.is_empty() || from.namespace.is_empty() {
                errors.push(format!("spec.from[{}]", i), "kind and namespace are required");
            }
        }
        for (i, to) in policy.spec.to.iter().enumerate() {
            if to.kind.is_empty() {
                errors.push(format!("spec.to[{}].kind", i), "kind is required");
            }
        }
        errors.into_result()
    }

    fn validate_update(&self, _old: &ReferencePolicy, policy: &ReferencePolicy) -> Result<(), ValidationErrors> {
        self.validate_create(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canal_api::gateway::gateway::{GatewayTlsConfig, SecretObjectReference};
    use canal_api::gateway::gateway_class::GatewayClassSpec;
    use canal_api::gateway::http_route::{HTTPRouteFilter, HTTPRouteRule, HTTPRouteSpec};
    use canal_api::gateway::reference_policy::{ReferencePolicyFrom, ReferencePolicySpec, ReferencePolicyTo};
    use canal_api::gateway::routes::{TCPRouteSpec, TLSRouteSpec};

    fn listener(name: &str, protocol: &str, port: i32) -> Listener {
        Listener {
            name: name.to_string(),
            protocol: protocol.to_string(),
            port,
            ..Default::default()
        }
    }

    fn gateway(listeners: Vec<Listener>) -> Gateway {
        Gateway::new(
            "gw",
            GatewaySpec {
                gateway_class_name: "flomesh".to_string(),
                listeners,
            },
        )
    }

    fn service_backend(name: &str, port: Option<i32>) -> BackendRef {
        BackendRef {
            name: name.to_string(),
            port,
            ..Default::default()
        }
    }

    #[test]
    fn test_gateway_listener_rules() {
        let mut https = listener("https", "HTTPS", 443);
        https.tls = Some(GatewayTlsConfig {
            mode: None,
            certificate_refs: vec![SecretObjectReference {
                name: "gw-cert".to_string(),
                namespace: None,
            }],
        });
        let ok = gateway(vec![listener("http", "HTTP", 80), https]);
        assert!(GatewayHook.validate_create(&ok).is_ok());

        let mut tcp = listener("tcp", "TCP", 9000);
        tcp.hostname = Some("db.example.com".to_string());
        let bad = gateway(vec![
            listener("http", "HTTP", 80),
            listener("http", "HTTP", 8080),
            listener("tls", "TLS", 8443),
            tcp,
            listener("quic", "QUIC", 443),
        ]);
        let errors = GatewayHook.validate_create(&bad).unwrap_err();
        assert!(errors.has_field("spec.listeners[1].name"));
        assert!(errors.has_field("spec.listeners[2].tls"));
        assert!(errors.has_field("spec.listeners[3].hostname"));
        assert!(errors.has_field("spec.listeners[4].protocol"));
    }

    #[test]
    fn test_gateway_terminate_needs_certificates() {
        let mut tls = listener("tls", "TLS", 8443);
        tls.tls = Some(GatewayTlsConfig::default());
        let mut gw = gateway(vec![tls]);
        GatewayHook.set_defaults(&mut gw);
        assert_eq!(
            gw.spec.listeners[0].tls.as_ref().and_then(|t| t.mode.as_deref()),
            Some("Terminate")
        );
        let errors = GatewayHook.validate_create(&gw).unwrap_err();
        assert!(errors.has_field("spec.listeners[0].tls.certificateRefs"));

        gw.spec.listeners[0].tls.as_mut().unwrap().mode = Some("Passthrough".to_string());
        assert!(GatewayHook.validate_create(&gw).is_ok());
    }

    #[test]
    fn test_gateway_class_controller_is_immutable() {
        let old = GatewayClass::new(
            "flomesh",
            GatewayClassSpec {
                controller_name: "flomesh.io/gateway-controller".to_string(),
                description: None,
            },
        );
        let mut new = old.clone();
        new.spec.description = Some("changed".to_string());
        assert!(GatewayClassHook.validate_update(&old, &new).is_ok());

        new.spec.controller_name = "example.com/other".to_string();
        assert!(GatewayClassHook
            .validate_update(&old, &new)
            .unwrap_err()
            .has_field("spec.controllerName"));
    }

    #[test]
    fn test_http_route_defaults_and_rules() {
        let mut route = HTTPRoute::new(
            "r",
            HTTPRouteSpec {
                rules: vec![HTTPRouteRule {
                    backend_refs: vec![service_backend("s", Some(80))],
                    ..Default::default()
                }],
                ..Default::default()
            },
        );
        HTTPRouteHook.set_defaults(&mut route);
        let once = route.clone();
        HTTPRouteHook.set_defaults(&mut route);
        assert_eq!(route, once);
        assert_eq!(route.spec.rules[0].matches[0].path, Some(default_path_match()));
        assert!(HTTPRouteHook.validate_create(&route).is_ok());

        let rule = &mut route.spec.rules[0];
        rule.matches[0].path = Some(HTTPPathMatch {
            type_: Some("PathPrefix".to_string()),
            value: Some("/api/".to_string()),
        });
        rule.filters = vec![
            HTTPRouteFilter {
                type_: "RequestRedirect".to_string(),
            },
            HTTPRouteFilter {
                type_: "URLRewrite".to_string(),
            },
            HTTPRouteFilter {
                type_: "Teleport".to_string(),
            },
        ];
        rule.backend_refs.push(service_backend("t", None));
        let errors = HTTPRouteHook.validate_create(&route).unwrap_err();
        assert!(errors.has_field("spec.rules[0].matches[0].path.value"));
        assert!(errors.has_field("spec.rules[0].filters"));
        assert!(errors.has_field("spec.rules[0].filters[2].type"));
        assert!(errors.has_field("spec.rules[0].backendRefs[1].port"));
    }

    #[test]
    fn test_parent_ref_limit() {
        let parent_refs = (0..=MAX_PARENT_REFS)
            .map(|i| ParentReference {
                name: format!("gw-{}", i),
                ..Default::default()
            })
            .collect();
        let route = TCPRoute::new(
            "r",
            TCPRouteSpec {
                parent_refs,
                rules: vec![L4RouteRule {
                    backend_refs: vec![service_backend("s", Some(5432))],
                }],
            },
        );
        assert!(TCPRouteHook
            .validate_create(&route)
            .unwrap_err()
            .has_field("spec.parentRefs"));
    }

    #[test]
    fn test_tls_route_hostnames() {
        let route = TLSRoute::new(
            "r",
            TLSRouteSpec {
                hostnames: vec![
                    "*.example.com".to_string(),
                    "10.0.0.1".to_string(),
                    "bad..name".to_string(),
                ],
                rules: vec![L4RouteRule {
                    backend_refs: vec![service_backend("s", Some(443))],
                }],
                ..Default::default()
            },
        );
        let errors = TLSRouteHook.validate_create(&route).unwrap_err();
        assert!(!errors.has_field("spec.hostnames[0]"));
        assert!(errors.has_field("spec.hostnames[1]"));
        assert!(errors.has_field("spec.hostnames[2]"));
    }

    #[test]
    fn test_udp_route_requires_backends() {
        let route = UDPRoute::new("r", Default::default());
        assert!(UDPRouteHook
            .validate_create(&route)
            .unwrap_err()
            .has_field("spec.rules"));
    }

    #[test]
    fn test_reference_policy_from_and_to() {
        let empty = ReferencePolicy::new("p", ReferencePolicySpec::default());
        let errors = ReferencePolicyHook.validate_create(&empty).unwrap_err();
        assert!(errors.has_field("spec.from"));
        assert!(errors.has_field("spec.to"));

        let ok = ReferencePolicy::new(
            "p",
            ReferencePolicySpec {
                from: vec![ReferencePolicyFrom {
                    group: "gateway.networking.k8s.io".to_string(),
                    kind: "HTTPRoute".to_string(),
                    namespace: "apps".to_string(),
                }],
                to: vec![ReferencePolicyTo {
                    group: String::new(),
                    kind: "Service".to_string(),
                    name: None,
                }],
            },
        );
        assert!(ReferencePolicyHook.validate_create(&ok).is_ok());
    }
}
