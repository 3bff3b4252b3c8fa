use std::collections::HashSet;
use std::net::IpAddr;

use canal_api::v1alpha1::ServiceImportType;
use canal_api::ServiceImport;

use super::{check_cluster_key, check_port, is_dns_label};
use crate::hook::{AdmissionHook, ValidationErrors};

const PROTOCOLS: [&str; 3] = ["TCP", "UDP", "SCTP"];

pub struct ServiceImportHook;

impl AdmissionHook for ServiceImportHook {
    type Object = ServiceImport;

    fn set_defaults(&self, import: &mut ServiceImport) {
        if import.spec.type_.is_none() {
            import.spec.type_ = Some(ServiceImportType::ClusterSetIP);
        }
        for port in &mut import.spec.ports {
            if port.protocol.is_none() {
                port.protocol = Some("TCP".to_string());
            }
        }
    }

    fn validate_create(&self, import: &ServiceImport) -> Result<(), ValidationErrors> {
        validate(import)
    }

    fn validate_update(&self, _old: &ServiceImport, import: &ServiceImport) -> Result<(), ValidationErrors> {
        validate(import)
    }
}

fn validate(import: &ServiceImport) -> Result<(), ValidationErrors> {
    let spec = &import.spec;
    let mut errors = ValidationErrors::new();

    for (i, ip) in spec.ips.iter().enumerate() {
        if ip.parse::<IpAddr>().is_err() {
            errors.push(format!("spec.ips[{}]", i), format!("{:?} is not a valid IP address", ip));
        }
    }
    if spec.effective_type() == ServiceImportType::Headless && !spec.ips.is_empty() {
        errors.push("spec.ips", "a Headless import must not carry IPs");
    }

    if spec.ports.is_empty() {
        errors.push("spec.ports", "at least one port is required");
    }

    let mut names = HashSet::new();
    for (i, port) in spec.ports.iter().enumerate() {
        let field = format!("spec.ports[{}]", i);
        check_port(&mut errors, format!("{}.port", field), port.port);

        match port.name.as_deref() {
            Some(name) => {
                if !is_dns_label(name) {
                    errors.push(format!("{}.name", field), format!("{:?} is not a DNS label", name));
                }
                if !names.insert(name) {
                    errors.push(format!("{}.name", field), format!("duplicate port name {:?}", name));
                }
            }
            None if spec.ports.len() > 1 => {
                errors.push(format!("{}.name", field), "name is required when more than one port is set");
            }
            None => {}
        }

        if let Some(protocol) = port.protocol.as_deref() {
            if !PROTOCOLS.contains(&protocol) {
                errors.push(format!("{}.protocol", field), format!("unsupported protocol {:?}", protocol));
            }
        }

        for (j, endpoint) in port.endpoints.iter().enumerate() {
            let field = format!("{}.endpoints[{}]", field, j);
            check_cluster_key(&mut errors, format!("{}.clusterKey", field), &endpoint.cluster_key);
            check_port(&mut errors, format!("{}.target.port", field), endpoint.target.port);
        }
    }

    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use canal_api::v1alpha1::service_import::{Endpoint, ServiceImportSpec, ServicePort, Target};

    fn port(name: Option<&str>, number: i32) -> ServicePort {
        ServicePort {
            name: name.map(str::to_string),
            port: number,
            ..Default::default()
        }
    }

    fn import(ports: Vec<ServicePort>) -> ServiceImport {
        ServiceImport::new(
            "i",
            ServiceImportSpec {
                ports,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_valid_import() {
        let mut simp = import(vec![port(Some("http"), 80), port(Some("grpc"), 9090)]);
        simp.spec.ips = vec!["10.1.0.1".to_string(), "fd00::1".to_string()];
        simp.spec.ports[0].endpoints.push(Endpoint {
            cluster_key: "eu/fra/blue/c1".to_string(),
            target: Target {
                ip: Some("192.168.1.10".to_string()),
                port: 8080,
                ..Default::default()
            },
        });
        assert!(ServiceImportHook.validate_create(&simp).is_ok());
    }

    #[test]
    fn test_port_name_rules() {
        let simp = import(vec![port(Some("http"), 80), port(Some("http"), 81), port(None, 82)]);
        let errors = ServiceImportHook.validate_create(&simp).unwrap_err();
        assert!(errors.has_field("spec.ports[1].name"));
        assert!(errors.has_field("spec.ports[2].name"));
        assert!(!errors.has_field("spec.ports[0].name"));

        // a single port may stay unnamed
        assert!(ServiceImportHook.validate_create(&import(vec![port(None, 80)])).is_ok());
    }

    #[test]
    fn test_ip_and_type_rules() {
        let mut simp = import(vec![port(None, 80)]);
        simp.spec.ips = vec!["10.1.0.300".to_string()];
        assert!(ServiceImportHook
            .validate_create(&simp)
            .unwrap_err()
            .has_field("spec.ips[0]"));

        simp.spec.ips = vec!["10.1.0.3".to_string()];
        simp.spec.type_ = Some(ServiceImportType::Headless);
        assert!(ServiceImportHook
            .validate_create(&simp)
            .unwrap_err()
            .has_field("spec.ips"));
    }

    #[test]
    fn test_protocol_and_endpoint_rules() {
        let mut simp = import(vec![port(None, 80)]);
        simp.spec.ports[0].protocol = Some("HTTP".to_string());
        simp.spec.ports[0].endpoints.push(Endpoint {
            cluster_key: "c1".to_string(),
            target: Target {
                port: 0,
                ..Default::default()
            },
        });
        let errors = ServiceImportHook.validate_create(&simp).unwrap_err();
        assert!(errors.has_field("spec.ports[0].protocol"));
        assert!(errors.has_field("spec.ports[0].endpoints[0].clusterKey"));
        assert!(errors.has_field("spec.ports[0].endpoints[0].target.port"));
    }

    #[test]
    fn test_defaults() {
        let mut simp = import(vec![port(None, 80)]);
        ServiceImportHook.set_defaults(&mut simp);
        let once = simp.clone();
        ServiceImportHook.set_defaults(&mut simp);

        assert_eq!(simp, once);
        assert_eq!(simp.spec.type_, Some(ServiceImportType::ClusterSetIP));
        assert_eq!(simp.spec.ports[0].protocol.as_deref(), Some("TCP"));
    }
}
