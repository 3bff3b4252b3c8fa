//! Process and mesh configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use canal_api::names::{INGRESS_CLASS_NAME, MESH_CONFIG_NAME, WEBHOOK_SERVICE_NAME};

use crate::{CoreError, Result};

pub const DEFAULT_NAMESPACE: &str = "flomesh";
pub const DEFAULT_WEBHOOK_PORT: u16 = 9443;
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Log output format of the controller process
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Settings of the controller process, read from its environment
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Namespace the controller runs in; owns the CA secret and mesh config
    pub namespace: String,
    pub mesh_config_name: String,
    pub webhook_service_name: String,
    pub webhook_port: u16,
    pub metrics_port: u16,
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            mesh_config_name: MESH_CONFIG_NAME.to_string(),
            webhook_service_name: WEBHOOK_SERVICE_NAME.to_string(),
            webhook_port: DEFAULT_WEBHOOK_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            log_format: LogFormat::Text,
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; unset variables keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup("CANAL_NAMESPACE") {
            config.namespace = v;
        }
        if let Some(v) = lookup("CANAL_MESH_CONFIG") {
            config.mesh_config_name = v;
        }
        if let Some(v) = lookup("CANAL_WEBHOOK_SERVICE") {
            config.webhook_service_name = v;
        }
        if let Some(v) = lookup("CANAL_WEBHOOK_PORT") {
            config.webhook_port = parse_port("CANAL_WEBHOOK_PORT", &v)?;
        }
        if let Some(v) = lookup("CANAL_METRICS_PORT") {
            config.metrics_port = parse_port("CANAL_METRICS_PORT", &v)?;
        }
        if let Some(v) = lookup("CANAL_LOG_FORMAT") {
            config.log_format = match v.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" | "" => LogFormat::Text,
                other => {
                    return Err(CoreError::InvalidInput(format!(
                        "CANAL_LOG_FORMAT must be text or json, got {:?}",
                        other
                    )))
                }
            };
        }
        Ok(config)
    }

    /// DNS name the API server uses to reach the webhook service
    pub fn webhook_host(&self) -> String {
        format!("{}.{}.svc", self.webhook_service_name, self.namespace)
    }
}

fn parse_port(var: &str, value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| CoreError::InvalidInput(format!("{} is not a valid port: {:?}", var, value)))
}

/// Which issuer backs the mesh PKI
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CertificateManagerKind {
    /// Root CA supplied by the operator in the CA secret
    Manual,
    /// Root CA generated and stored by the controller
    #[default]
    Archon,
    /// Issuance delegated to cert-manager
    CertManager,
}

/// Contents of the mesh ConfigMap
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeshConfig {
    pub certificate: CertificateConfig,
    pub ingress: IngressConfig,
    pub webhook: WebhookConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CertificateConfig {
    pub manager: CertificateManagerKind,
    pub root_cert_validity_duration: String,
    pub service_cert_validity_duration: String,
    pub ca_subject: CaSubject,
    pub cert_manager: CertManagerConfig,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            manager: CertificateManagerKind::Archon,
            root_cert_validity_duration: "87600h".to_string(),
            service_cert_validity_duration: "8760h".to_string(),
            ca_subject: CaSubject::default(),
            cert_manager: CertManagerConfig::default(),
        }
    }
}

impl CertificateConfig {
    pub fn root_validity(&self) -> Result<Duration> {
        parse_duration(&self.root_cert_validity_duration)
    }

    pub fn service_validity(&self) -> Result<Duration> {
        parse_duration(&self.service_cert_validity_duration)
    }
}

/// Distinguished name fields of the mesh root CA
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaSubject {
    pub common_name: String,
    pub country: String,
    pub locality: String,
    pub organization: String,
}

impl Default for CaSubject {
    fn default() -> Self {
        Self {
            common_name: "flomesh.io".to_string(),
            country: "CN".to_string(),
            locality: "Haidian".to_string(),
            organization: "flomesh.io".to_string(),
        }
    }
}

/// Names of the cert-manager objects the external issuer creates
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CertManagerConfig {
    pub self_signed_issuer_name: String,
    pub ca_certificate_name: String,
    pub ca_issuer_name: String,
}

impl Default for CertManagerConfig {
    fn default() -> Self {
        Self {
            self_signed_issuer_name: "flomesh-selfsigned".to_string(),
            ca_certificate_name: "flomesh-ca".to_string(),
            ca_issuer_name: "flomesh-ca-issuer".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressConfig {
    pub enabled: bool,
    pub class_name: String,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            class_name: INGRESS_CLASS_NAME.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookConfig {
    /// Label selector restricting which namespaces the webhooks see
    pub namespace_selector: BTreeMap<String, String>,
}

impl MeshConfig {
    /// Parse and check the JSON document stored in the mesh ConfigMap
    pub fn from_json(data: &str) -> Result<Self> {
        let config: MeshConfig = serde_json::from_str(data)
            .map_err(|e| CoreError::InvalidInput(format!("mesh config is not valid: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let root = self.certificate.root_validity()?;
        let service = self.certificate.service_validity()?;
        if root.is_zero() || service.is_zero() {
            return Err(CoreError::InvalidInput(
                "certificate validity durations must be positive".to_string(),
            ));
        }
        if service > root {
            return Err(CoreError::InvalidInput(format!(
                "serviceCertValidityDuration {} exceeds rootCertValidityDuration {}",
                self.certificate.service_cert_validity_duration,
                self.certificate.root_cert_validity_duration
            )));
        }
        if self.ingress.enabled && self.ingress.class_name.is_empty() {
            return Err(CoreError::InvalidInput(
                "ingress.className must be set when ingress is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a Go-style duration such as `"8760h"`, `"30m"` or `"1h30m15s"`.
///
/// Supported units are `h`, `m`, `s`, `ms`; fractional values are accepted.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || CoreError::InvalidInput(format!("invalid duration {:?}", input));
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "h" => 3_600_000_000_000.0,
            "m" => 60_000_000_000.0,
            "s" => 1_000_000_000.0,
            "ms" => 1_000_000.0,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total_nanos += value * nanos_per_unit;
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("8760h").unwrap(), Duration::from_secs(8760 * 3600));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("1h30m15s").unwrap(), Duration::from_secs(5415));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for bad in ["", "h", "10", "10d", "1h-5m", "abc"] {
            assert!(parse_duration(bad).is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_controller_config_defaults() {
        let config = ControllerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.webhook_host(), "erie-canal-webhook-service.flomesh.svc");
    }

    #[test]
    fn test_controller_config_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CANAL_NAMESPACE", "mesh-system"),
            ("CANAL_WEBHOOK_PORT", "10443"),
            ("CANAL_LOG_FORMAT", "JSON"),
        ]
        .into_iter()
        .collect();
        let config = ControllerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.namespace, "mesh-system");
        assert_eq!(config.webhook_port, 10443);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_controller_config_bad_port() {
        let result = ControllerConfig::from_lookup(|k| {
            (k == "CANAL_WEBHOOK_PORT").then(|| "port".to_string())
        });
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_mesh_config_defaults_from_empty_document() {
        let config = MeshConfig::from_json("{}").unwrap();
        assert_eq!(config, MeshConfig::default());
        assert_eq!(config.certificate.manager, CertificateManagerKind::Archon);
        assert_eq!(config.ingress.class_name, "pipy");
    }

    #[test]
    fn test_mesh_config_parses_manager() {
        let config = MeshConfig::from_json(
            r#"{"certificate": {"manager": "cert-manager", "serviceCertValidityDuration": "24h"}}"#,
        )
        .unwrap();
        assert_eq!(config.certificate.manager, CertificateManagerKind::CertManager);
        assert_eq!(
            config.certificate.service_validity().unwrap(),
            Duration::from_secs(86400)
        );
    }

    #[test]
    fn test_mesh_config_rejects_bad_values() {
        assert!(MeshConfig::from_json(r#"{"certificate": {"manager": "vault"}}"#).is_err());
        assert!(MeshConfig::from_json(
            r#"{"certificate": {"rootCertValidityDuration": "1h", "serviceCertValidityDuration": "2h"}}"#
        )
        .is_err());
        assert!(MeshConfig::from_json(r#"{"ingress": {"enabled": true, "className": ""}}"#).is_err());
    }
}
