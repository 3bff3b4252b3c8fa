//! Mutating and validating webhook configurations pointing the API server
//! at the admission endpoint

use std::collections::BTreeMap;

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    ValidatingWebhook, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::{debug, info};

use canal_api::names::{MUTATING_WEBHOOK_CONFIGURATION_NAME, VALIDATING_WEBHOOK_CONFIGURATION_NAME};
use canal_core::store::ClusterObject;
use canal_core::{ClusterStore, CoreError, Result};

use crate::registry::{HookDescriptor, HookRegistry};

const FAILURE_POLICY: &str = "Fail";
const MATCH_POLICY: &str = "Exact";
const SIDE_EFFECTS: &str = "None";
const ADMISSION_REVIEW_VERSIONS: [&str; 1] = ["v1"];
const OPERATIONS: [&str; 2] = ["CREATE", "UPDATE"];

/// Where the API server reaches the webhooks and how it trusts them
#[derive(Clone, Debug, PartialEq)]
pub struct WebhookTarget {
    pub service_namespace: String,
    pub service_name: String,
    pub port: i32,
    /// PEM bundle of the root CA that signed the serving certificate
    pub ca_bundle: String,
    /// Only namespaces carrying these labels are admitted; empty means all
    pub namespace_selector: BTreeMap<String, String>,
}

impl WebhookTarget {
    fn client_config(&self, path: String) -> WebhookClientConfig {
        WebhookClientConfig {
            ca_bundle: Some(ByteString(self.ca_bundle.as_bytes().to_vec())),
            service: Some(ServiceReference {
                name: self.service_name.clone(),
                namespace: self.service_namespace.clone(),
                path: Some(path),
                port: Some(self.port),
            }),
            url: None,
        }
    }

    fn namespace_selector(&self) -> Option<LabelSelector> {
        if self.namespace_selector.is_empty() {
            return None;
        }
        Some(LabelSelector {
            match_labels: Some(self.namespace_selector.clone()),
            match_expressions: None,
        })
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn rule(descriptor: &HookDescriptor) -> RuleWithOperations {
    RuleWithOperations {
        api_groups: Some(vec![descriptor.group.clone()]),
        api_versions: Some(vec![descriptor.version.clone()]),
        operations: Some(strings(&OPERATIONS)),
        resources: Some(vec![descriptor.plural.clone()]),
        scope: None,
    }
}

pub fn mutating_configuration(registry: &HookRegistry, target: &WebhookTarget) -> MutatingWebhookConfiguration {
    let webhooks = registry
        .descriptors()
        .into_iter()
        .map(|d| MutatingWebhook {
            name: d.mutating_webhook_name(),
            client_config: target.client_config(d.mutate_path()),
            rules: Some(vec![rule(d)]),
            failure_policy: Some(FAILURE_POLICY.to_string()),
            match_policy: Some(MATCH_POLICY.to_string()),
            side_effects: SIDE_EFFECTS.to_string(),
            admission_review_versions: strings(&ADMISSION_REVIEW_VERSIONS),
            namespace_selector: target.namespace_selector(),
            ..Default::default()
        })
        .collect();

    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(MUTATING_WEBHOOK_CONFIGURATION_NAME.to_string()),
            ..Default::default()
        },
        webhooks: Some(webhooks),
    }
}

pub fn validating_configuration(registry: &HookRegistry, target: &WebhookTarget) -> ValidatingWebhookConfiguration {
    let webhooks = registry
        .descriptors()
        .into_iter()
        .map(|d| ValidatingWebhook {
            name: d.validating_webhook_name(),
            client_config: target.client_config(d.validate_path()),
            rules: Some(vec![rule(d)]),
            failure_policy: Some(FAILURE_POLICY.to_string()),
            match_policy: Some(MATCH_POLICY.to_string()),
            side_effects: SIDE_EFFECTS.to_string(),
            admission_review_versions: strings(&ADMISSION_REVIEW_VERSIONS),
            namespace_selector: target.namespace_selector(),
            ..Default::default()
        })
        .collect();

    ValidatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(VALIDATING_WEBHOOK_CONFIGURATION_NAME.to_string()),
            ..Default::default()
        },
        webhooks: Some(webhooks),
    }
}

/// Create `desired`, or replace the stored copy when its webhooks differ
async fn apply<S, K>(store: &S, mut desired: K) -> Result<()>
where
    S: ClusterStore,
    K: ClusterObject,
{
    let name = desired.name_any();
    let existing = match store.get_cluster::<K>(&name).await? {
        Some(existing) => existing,
        None => match store.create_cluster(&desired).await {
            Ok(_) => {
                info!("Created {} {}", K::kind(&()), name);
                return Ok(());
            }
            Err(CoreError::AlreadyExists(_)) => store
                .get_cluster::<K>(&name)
                .await?
                .ok_or_else(|| CoreError::NotFound(name.clone()))?,
            Err(e) => return Err(e),
        },
    };

    let webhooks = |obj: &K| serde_json::to_value(obj).map(|v| v["webhooks"].clone());
    if webhooks(&existing)? == webhooks(&desired)? {
        debug!("{} {} is up to date", K::kind(&()), name);
        return Ok(());
    }

    desired.meta_mut().resource_version = existing.resource_version();
    store.update_cluster(&desired).await?;
    info!("Updated {} {}", K::kind(&()), name);
    Ok(())
}

/// Register every hook with the API server, creating or updating both configurations
pub async fn register_configurations<S: ClusterStore>(
    store: &S,
    registry: &HookRegistry,
    target: &WebhookTarget,
) -> Result<()> {
    apply(store, mutating_configuration(registry, target)).await?;
    apply(store, validating_configuration(registry, target)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::default_registry;
    use canal_core::MemoryStore;

    fn target() -> WebhookTarget {
        WebhookTarget {
            service_namespace: "flomesh".to_string(),
            service_name: "erie-canal-webhook-service".to_string(),
            port: 9443,
            ca_bundle: "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n".to_string(),
            namespace_selector: BTreeMap::new(),
        }
    }

    #[test]
    fn test_binding_shape() {
        let registry = default_registry("flomesh-mesh-config");
        let config = validating_configuration(&registry, &target());
        let webhooks = config.webhooks.unwrap();
        assert_eq!(webhooks.len(), registry.descriptors().len());

        let gtp = webhooks
            .iter()
            .find(|w| w.name == "vglobaltrafficpolicy.kb.flomesh.io")
            .unwrap();
        assert_eq!(gtp.failure_policy.as_deref(), Some("Fail"));
        assert_eq!(gtp.match_policy.as_deref(), Some("Exact"));
        assert_eq!(gtp.side_effects, "None");
        assert_eq!(gtp.admission_review_versions, vec!["v1".to_string()]);
        assert!(gtp.namespace_selector.is_none());

        let rule = &gtp.rules.as_ref().unwrap()[0];
        assert_eq!(rule.api_groups, Some(vec!["flomesh.io".to_string()]));
        assert_eq!(rule.api_versions, Some(vec!["v1alpha1".to_string()]));
        assert_eq!(rule.resources, Some(vec!["globaltrafficpolicies".to_string()]));
        assert_eq!(
            rule.operations,
            Some(vec!["CREATE".to_string(), "UPDATE".to_string()])
        );

        let service = gtp.client_config.service.as_ref().unwrap();
        assert_eq!(service.name, "erie-canal-webhook-service");
        assert_eq!(service.path.as_deref(), Some("/validate-flomesh-io-v1alpha1-globaltrafficpolicy"));
        assert_eq!(service.port, Some(9443));
    }

    #[test]
    fn test_namespace_selector() {
        let mut target = target();
        target.namespace_selector.insert("flomesh.io/monitored-by".to_string(), "flomesh".to_string());
        let config = mutating_configuration(&default_registry("flomesh-mesh-config"), &target);
        let webhooks = config.webhooks.unwrap();
        let selector = webhooks[0].namespace_selector.as_ref().unwrap();
        assert_eq!(
            selector.match_labels.as_ref().unwrap().get("flomesh.io/monitored-by").map(String::as_str),
            Some("flomesh")
        );
    }

    #[tokio::test]
    async fn test_register_is_idempotent_and_tracks_ca() {
        let store = MemoryStore::new();
        let registry = default_registry("flomesh-mesh-config");

        register_configurations(&store, &registry, &target()).await.unwrap();
        assert_eq!(store.count::<MutatingWebhookConfiguration>(), 1);
        assert_eq!(store.count::<ValidatingWebhookConfiguration>(), 1);

        let first: ValidatingWebhookConfiguration = store
            .get_cluster(VALIDATING_WEBHOOK_CONFIGURATION_NAME)
            .await
            .unwrap()
            .unwrap();
        register_configurations(&store, &registry, &target()).await.unwrap();
        let second: ValidatingWebhookConfiguration = store
            .get_cluster(VALIDATING_WEBHOOK_CONFIGURATION_NAME)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.resource_version(), second.resource_version());

        let mut rotated = target();
        rotated.ca_bundle = "-----BEGIN CERTIFICATE-----\nBBBB\n-----END CERTIFICATE-----\n".to_string();
        register_configurations(&store, &registry, &rotated).await.unwrap();
        let third: MutatingWebhookConfiguration = store
            .get_cluster(MUTATING_WEBHOOK_CONFIGURATION_NAME)
            .await
            .unwrap()
            .unwrap();
        let bundle = third.webhooks.unwrap()[0]
            .client_config
            .ca_bundle
            .clone()
            .unwrap();
        assert_eq!(bundle.0, rotated.ca_bundle.as_bytes());
    }
}
