use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;

use canal_api::names::MESH_CONFIG_KEY;
use canal_core::MeshConfig;

use crate::hook::{AdmissionHook, ValidationErrors};

/// Guards the mesh ConfigMap; every other ConfigMap is admitted untouched
pub struct ConfigMapHook {
    mesh_config_name: String,
}

impl ConfigMapHook {
    pub fn new(mesh_config_name: impl Into<String>) -> Self {
        Self {
            mesh_config_name: mesh_config_name.into(),
        }
    }

    fn is_mesh_config(&self, cm: &ConfigMap) -> bool {
        cm.name_any() == self.mesh_config_name
    }

    fn parse(&self, cm: &ConfigMap) -> Result<MeshConfig, ValidationErrors> {
        let field = format!("data[{}]", MESH_CONFIG_KEY);
        let mut errors = ValidationErrors::new();
        let Some(data) = cm.data.as_ref().and_then(|d| d.get(MESH_CONFIG_KEY)) else {
            errors.push(field, "mesh config document is missing");
            return Err(errors);
        };
        MeshConfig::from_json(data).map_err(|e| {
            errors.push(field, e.to_string());
            errors
        })
    }
}

impl AdmissionHook for ConfigMapHook {
    type Object = ConfigMap;

    fn validate_create(&self, cm: &ConfigMap) -> Result<(), ValidationErrors> {
        if !self.is_mesh_config(cm) {
            return Ok(());
        }
        self.parse(cm).map(|_| ())
    }

    fn validate_update(&self, old: &ConfigMap, cm: &ConfigMap) -> Result<(), ValidationErrors> {
        if !self.is_mesh_config(cm) {
            return Ok(());
        }
        let config = self.parse(cm)?;

        // An unparsable old document cannot pin the issuer
        if let Ok(previous) = self.parse(old) {
            if previous.certificate.manager != config.certificate.manager {
                let mut errors = ValidationErrors::new();
                errors.push(
                    format!("data[{}].certificate.manager", MESH_CONFIG_KEY),
                    format!(
                        "certificate manager cannot change from {:?} to {:?}",
                        previous.certificate.manager, config.certificate.manager
                    ),
                );
                return Err(errors);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn config_map(name: &str, document: Option<&str>) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("flomesh".to_string()),
                ..Default::default()
            },
            data: document.map(|d| BTreeMap::from([(MESH_CONFIG_KEY.to_string(), d.to_string())])),
            ..Default::default()
        }
    }

    fn hook() -> ConfigMapHook {
        ConfigMapHook::new("flomesh-mesh-config")
    }

    #[test]
    fn test_other_config_maps_pass() {
        let cm = config_map("unrelated", Some("not json"));
        assert!(hook().validate_create(&cm).is_ok());
        assert!(hook().validate_update(&cm, &cm).is_ok());
    }

    #[test]
    fn test_mesh_config_must_parse() {
        assert!(hook()
            .validate_create(&config_map("flomesh-mesh-config", Some("{}")))
            .is_ok());

        let missing = hook()
            .validate_create(&config_map("flomesh-mesh-config", None))
            .unwrap_err();
        assert!(missing.has_field("data[mesh_config.json]"));

        let bad_duration = config_map(
            "flomesh-mesh-config",
            Some(r#"{"certificate": {"serviceCertValidityDuration": "forever"}}"#),
        );
        assert!(hook().validate_create(&bad_duration).is_err());
    }

    #[test]
    fn test_certificate_manager_is_pinned() {
        let old = config_map("flomesh-mesh-config", Some(r#"{"certificate": {"manager": "archon"}}"#));
        let new = config_map(
            "flomesh-mesh-config",
            Some(r#"{"certificate": {"manager": "cert-manager"}}"#),
        );
        let errors = hook().validate_update(&old, &new).unwrap_err();
        assert!(errors.has_field("data[mesh_config.json].certificate.manager"));

        let renewed = config_map(
            "flomesh-mesh-config",
            Some(r#"{"certificate": {"manager": "archon", "serviceCertValidityDuration": "24h"}}"#),
        );
        assert!(hook().validate_update(&old, &renewed).is_ok());
    }
}
