//! Feeds the cluster IP of a derived Service back into its ServiceImport

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use canal_api::ServiceImport;
use canal_core::{ClusterStore, ObjectKey, ReconcileOutcome, Reconciler, Result};

/// `clusterIP` values that do not name an address
const NO_CLUSTER_IP: [&str; 2] = ["", "None"];

pub struct ServiceReconciler<S> {
    store: Arc<S>,
}

impl<S: ClusterStore> ServiceReconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

/// Name of the ServiceImport owning `service`, if any
fn owning_import(service: &Service) -> Option<String> {
    service
        .owner_references()
        .iter()
        .find(|o| o.api_version == ServiceImport::api_version(&()) && o.kind == ServiceImport::kind(&()))
        .map(|o| o.name.clone())
}

#[async_trait]
impl<S: ClusterStore> Reconciler for ServiceReconciler<S> {
    type Object = Service;

    fn name(&self) -> &'static str {
        "service"
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let Some(service) = self.store.get::<Service>(&key.namespace, &key.name).await? else {
            return Ok(ReconcileOutcome::Done);
        };
        if service.meta().deletion_timestamp.is_some() {
            return Ok(ReconcileOutcome::Done);
        }
        let Some(import_name) = owning_import(&service) else {
            return Ok(ReconcileOutcome::Done);
        };

        let Some(mut import) = self
            .store
            .get::<ServiceImport>(&key.namespace, &import_name)
            .await?
        else {
            debug!(namespace = %key.namespace, name = %import_name, "Owning ServiceImport is gone");
            return Ok(ReconcileOutcome::Done);
        };
        if !import.spec.ips.is_empty() {
            return Ok(ReconcileOutcome::Done);
        }

        let cluster_ip = service
            .spec
            .as_ref()
            .and_then(|s| s.cluster_ip.clone())
            .unwrap_or_default();
        if NO_CLUSTER_IP.contains(&cluster_ip.as_str()) {
            debug!(namespace = %key.namespace, name = %key.name, "Cluster IP not allocated yet");
            return Ok(ReconcileOutcome::Done);
        }

        import.spec.ips = vec![cluster_ip.clone()];
        self.store.update(&import).await?;
        info!(
            namespace = %key.namespace,
            name = %import_name,
            ip = %cluster_ip,
            "Set ServiceImport IP from derived Service"
        );
        Ok(ReconcileOutcome::Done)
    }
}
