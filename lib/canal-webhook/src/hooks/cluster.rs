use canal_api::v1alpha1::cluster::DEFAULT_KEY_SEGMENT;
use canal_api::Cluster;

use super::{check_port, is_dns_label, is_hostname};
use crate::hook::{AdmissionHook, ValidationErrors};

/// Port assumed for a gateway when only its host is given
const DEFAULT_GATEWAY_PORT: i32 = 80;

pub struct ClusterHook;

impl AdmissionHook for ClusterHook {
    type Object = Cluster;

    fn set_defaults(&self, cluster: &mut Cluster) {
        let spec = &mut cluster.spec;
        for segment in [&mut spec.region, &mut spec.zone, &mut spec.group] {
            if segment.is_none() {
                *segment = Some(DEFAULT_KEY_SEGMENT.to_string());
            }
        }
        if spec.gateway_host.is_some() && spec.gateway_port.is_none() {
            spec.gateway_port = Some(DEFAULT_GATEWAY_PORT);
        }
    }

    fn validate_create(&self, cluster: &Cluster) -> Result<(), ValidationErrors> {
        validate(cluster)
    }

    fn validate_update(&self, old: &Cluster, cluster: &Cluster) -> Result<(), ValidationErrors> {
        let mut errors = validate(cluster).err().unwrap_or_default();
        if old.key() != cluster.key() {
            errors.push(
                "spec",
                format!("cluster key is immutable, was {} now {}", old.key(), cluster.key()),
            );
        }
        errors.into_result()
    }
}

fn validate(cluster: &Cluster) -> Result<(), ValidationErrors> {
    let spec = &cluster.spec;
    let mut errors = ValidationErrors::new();

    for (field, segment) in [
        ("spec.region", &spec.region),
        ("spec.zone", &spec.zone),
        ("spec.group", &spec.group),
    ] {
        if let Some(value) = segment {
            if !is_dns_label(value) {
                errors.push(field, format!("{:?} is not a DNS label", value));
            }
        }
    }

    match spec.gateway_host.as_deref() {
        Some(host) if host.parse::<std::net::IpAddr>().is_ok() || is_hostname(host, false) => {}
        Some(host) => errors.push("spec.gatewayHost", format!("{:?} is neither an IP nor a host name", host)),
        None => errors.push("spec.gatewayHost", "gateway host is required"),
    }
    if let Some(port) = spec.gateway_port {
        check_port(&mut errors, "spec.gatewayPort", port);
    }

    if spec.kubeconfig.as_deref().map_or(true, |k| k.trim().is_empty()) {
        errors.push("spec.kubeconfig", "kubeconfig is required to join the cluster");
    }

    errors.into_result()
}
