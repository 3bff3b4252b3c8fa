use canal_api::v1alpha1::namespaced_ingress::{HttpListener, NamespacedIngressSpec};
use canal_api::NamespacedIngress;

use super::check_port;
use crate::hook::{AdmissionHook, ValidationErrors};

const DEFAULT_HTTP_PORT: i32 = 80;
const DEFAULT_TLS_PORT: i32 = 443;
const DEFAULT_REPLICAS: i32 = 1;
const DEFAULT_SERVICE_TYPE: &str = "LoadBalancer";
const SERVICE_TYPES: [&str; 3] = ["ClusterIP", "NodePort", "LoadBalancer"];
const NODE_PORT_RANGE: std::ops::RangeInclusive<i32> = 30000..=32767;

pub struct NamespacedIngressHook;

impl AdmissionHook for NamespacedIngressHook {
    type Object = NamespacedIngress;

    fn set_defaults(&self, ingress: &mut NamespacedIngress) {
        let spec = &mut ingress.spec;
        if spec.service_type.is_none() {
            spec.service_type = Some(DEFAULT_SERVICE_TYPE.to_string());
        }
        if spec.replicas.is_none() {
            spec.replicas = Some(DEFAULT_REPLICAS);
        }

        let http = spec.http.get_or_insert_with(|| HttpListener {
            enabled: true,
            ..Default::default()
        });
        if http.port.is_none() {
            http.port = Some(DEFAULT_HTTP_PORT);
        }

        if let Some(tls) = spec.tls.as_mut() {
            if tls.port.is_none() {
                tls.port = Some(DEFAULT_TLS_PORT);
            }
        }
    }

    fn validate_create(&self, ingress: &NamespacedIngress) -> Result<(), ValidationErrors> {
        validate(&ingress.spec)
    }

    fn validate_update(
        &self,
        _old: &NamespacedIngress,
        ingress: &NamespacedIngress,
    ) -> Result<(), ValidationErrors> {
        validate(&ingress.spec)
    }
}

fn validate(spec: &NamespacedIngressSpec) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if let Some(service_type) = spec.service_type.as_deref() {
        if !SERVICE_TYPES.contains(&service_type) {
            errors.push("spec.serviceType", format!("unsupported service type {:?}", service_type));
        }
    }
    if let Some(replicas) = spec.replicas {
        if replicas < 0 {
            errors.push("spec.replicas", "replicas must not be negative");
        }
    }
    if let Some(level) = spec.log_level {
        if !(1..=5).contains(&level) {
            errors.push("spec.logLevel", format!("log level {} must be 1-5", level));
        }
    }

    let http_enabled = spec.http.as_ref().map_or(false, |h| h.enabled);
    let tls_enabled = spec.tls.as_ref().map_or(false, |t| t.enabled);
    if spec.http.is_some() && spec.tls.is_some() && !http_enabled && !tls_enabled {
        errors.push("spec", "at least one of http or tls must be enabled");
    }

    if let Some(http) = &spec.http {
        check_listener(&mut errors, "spec.http", http.port, http.node_port);
    }
    if let Some(tls) = &spec.tls {
        check_listener(&mut errors, "spec.tls", tls.port, tls.node_port);
        if tls.mtls && !tls.enabled {
            errors.push("spec.tls.mtls", "mTLS requires the TLS listener to be enabled");
        }
    }
    if let (Some(http), Some(tls)) = (&spec.http, &spec.tls) {
        if http_enabled && tls_enabled && http.port.is_some() && http.port == tls.port {
            errors.push("spec.tls.port", "http and tls listeners must use different ports");
        }
    }

    errors.into_result()
}

fn check_listener(errors: &mut ValidationErrors, field: &str, port: Option<i32>, node_port: Option<i32>) {
    if let Some(port) = port {
        check_port(errors, format!("{}.port", field), port);
    }
    if let Some(node_port) = node_port {
        if !NODE_PORT_RANGE.contains(&node_port) {
            errors.push(
                format!("{}.nodePort", field),
                format!("node port {} must be {}-{}", node_port, NODE_PORT_RANGE.start(), NODE_PORT_RANGE.end()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canal_api::v1alpha1::namespaced_ingress::TlsListener;

    fn ingress(spec: NamespacedIngressSpec) -> NamespacedIngress {
        NamespacedIngress::new("nsig", spec)
    }

    #[test]
    fn test_defaults_fill_listeners() {
        let mut nsig = ingress(NamespacedIngressSpec {
            tls: Some(TlsListener {
                enabled: true,
                ..Default::default()
            }),
            ..Default::default()
        });
        NamespacedIngressHook.set_defaults(&mut nsig);
        let once = nsig.clone();
        NamespacedIngressHook.set_defaults(&mut nsig);

        assert_eq!(nsig, once);
        assert_eq!(nsig.spec.replicas, Some(1));
        assert_eq!(nsig.spec.service_type.as_deref(), Some("LoadBalancer"));
        assert_eq!(nsig.spec.http.as_ref().and_then(|h| h.port), Some(80));
        assert_eq!(nsig.spec.tls.as_ref().and_then(|t| t.port), Some(443));
        assert!(NamespacedIngressHook.validate_create(&nsig).is_ok());
    }

    #[test]
    fn test_port_and_replica_ranges() {
        let nsig = ingress(NamespacedIngressSpec {
            http: Some(HttpListener {
                enabled: true,
                port: Some(0),
                node_port: Some(80),
            }),
            replicas: Some(-1),
            log_level: Some(9),
            service_type: Some("ExternalName".to_string()),
            ..Default::default()
        });
        let errors = NamespacedIngressHook.validate_create(&nsig).unwrap_err();
        for field in [
            "spec.http.port",
            "spec.http.nodePort",
            "spec.replicas",
            "spec.logLevel",
            "spec.serviceType",
        ] {
            assert!(errors.has_field(field), "expected error on {}", field);
        }
    }

    #[test]
    fn test_listener_combinations() {
        let nsig = ingress(NamespacedIngressSpec {
            http: Some(HttpListener::default()),
            tls: Some(TlsListener {
                mtls: true,
                ..Default::default()
            }),
            ..Default::default()
        });
        let errors = NamespacedIngressHook.validate_create(&nsig).unwrap_err();
        assert!(errors.has_field("spec"));
        assert!(errors.has_field("spec.tls.mtls"));

        let clash = ingress(NamespacedIngressSpec {
            http: Some(HttpListener {
                enabled: true,
                port: Some(8443),
                node_port: None,
            }),
            tls: Some(TlsListener {
                enabled: true,
                port: Some(8443),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(NamespacedIngressHook
            .validate_create(&clash)
            .unwrap_err()
            .has_field("spec.tls.port"));
    }
}
