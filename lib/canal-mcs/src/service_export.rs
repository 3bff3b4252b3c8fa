//! ServiceExport controller
//!
//! Publishes an exported Service through a generated ingress and reports
//! the outcome on the export's `ServiceExportValid` condition. Problems with
//! the export itself (missing or unexportable Service, a path another
//! ingress already serves) are terminal: the condition explains them and
//! the export waits for its next change.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use tracing::{debug, info, warn};

use canal_api::names::{export_ingress_name, EXPORT_HASH_ANNOTATION};
use canal_api::v1alpha1::service_export::CONDITION_SERVICE_EXPORT_VALID;
use canal_api::{ConditionStatus, ServiceExport};
use canal_core::conditions::{new_condition, set_condition, REASON_FAILED, REASON_SUCCESS};
use canal_core::{spec_hash, ClusterStore, CoreError, ObjectKey, ReconcileOutcome, Reconciler, Result};

use crate::ingress::{build_ingress, export_annotations, find_path_conflict, ingress_rules};

const EXTERNAL_NAME: &str = "ExternalName";

pub struct ServiceExportReconciler<S> {
    store: Arc<S>,
    ingress_class: String,
}

impl<S: ClusterStore> ServiceExportReconciler<S> {
    pub fn new(store: Arc<S>, ingress_class: impl Into<String>) -> Self {
        Self {
            store,
            ingress_class: ingress_class.into(),
        }
    }

    /// Write the validity condition, skipping the write when nothing changed
    async fn set_valid(
        &self,
        mut export: ServiceExport,
        status: ConditionStatus,
        reason: &str,
        message: String,
    ) -> Result<()> {
        let generation = export.metadata.generation.unwrap_or_default();
        let conditions = &mut export.status.get_or_insert_with(Default::default).conditions;
        let condition = new_condition(CONDITION_SERVICE_EXPORT_VALID, status, generation, reason, message);
        if set_condition(conditions, condition) {
            self.store.update_status(&export).await?;
        }
        Ok(())
    }

    async fn reject(&self, key: &ObjectKey, export: ServiceExport, message: String) -> Result<ReconcileOutcome> {
        warn!(namespace = %key.namespace, name = %key.name, "ServiceExport rejected: {}", message);
        self.set_valid(export, ConditionStatus::False, REASON_FAILED, message)
            .await?;
        Ok(ReconcileOutcome::Done)
    }

    /// Persist `hash` on the export, returning the stored copy
    async fn record_hash(&self, mut export: ServiceExport, hash: String) -> Result<ServiceExport> {
        if export.annotations().get(EXPORT_HASH_ANNOTATION) == Some(&hash) {
            return Ok(export);
        }
        export
            .annotations_mut()
            .insert(EXPORT_HASH_ANNOTATION.to_string(), hash);
        self.store.update(&export).await
    }

    /// Create the generated ingress, or rewrite it when it no longer matches the export.
    ///
    /// The hash is written before the ingress, so a matching hash does not
    /// prove the ingress was written; its rules and annotations are compared
    /// against the export on every pass.
    async fn ensure_ingress(&self, key: &ObjectKey, export: ServiceExport) -> Result<ServiceExport> {
        let ingress_name = export_ingress_name(&key.name);
        let hash = spec_hash(&export.spec)?;

        let Some(mut ingress) = self.store.get::<Ingress>(&key.namespace, &ingress_name).await? else {
            let owner = export
                .controller_owner_ref(&())
                .ok_or_else(|| CoreError::Internal(format!("ServiceExport {} has no uid", key)))?;
            let mut ingress = build_ingress(&export, &self.ingress_class);
            ingress.metadata.owner_references = Some(vec![owner]);
            self.store.create(&ingress).await?;
            info!(namespace = %key.namespace, name = %ingress_name, "Created Ingress");
            return self.record_hash(export, hash).await;
        };

        let export = self.record_hash(export, hash).await?;
        let rules = ingress_rules(&export);
        let annotations = export_annotations(&export);
        let rules_match = ingress.spec.as_ref().and_then(|s| s.rules.as_ref()) == Some(&rules);
        let annotations_match = annotations
            .iter()
            .all(|(k, v)| ingress.annotations().get(k) == Some(v));
        if rules_match && annotations_match {
            debug!(namespace = %key.namespace, name = %ingress_name, "Ingress is up to date");
            return Ok(export);
        }

        ingress.spec.get_or_insert_with(Default::default).rules = Some(rules);
        ingress.annotations_mut().extend(annotations);
        self.store.update(&ingress).await?;
        info!(namespace = %key.namespace, name = %ingress_name, "Updated Ingress");
        Ok(export)
    }
}

#[async_trait]
impl<S: ClusterStore> Reconciler for ServiceExportReconciler<S> {
    type Object = ServiceExport;

    fn name(&self) -> &'static str {
        "serviceexport"
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let Some(mut export) = self
            .store
            .get::<ServiceExport>(&key.namespace, &key.name)
            .await?
        else {
            debug!(namespace = %key.namespace, name = %key.name, "ServiceExport is gone");
            return Ok(ReconcileOutcome::Done);
        };
        export.status.get_or_insert_with(Default::default);

        let service = match self.store.get::<Service>(&key.namespace, &key.name).await {
            Ok(Some(service)) => service,
            Ok(None) => return self.reject(key, export, format!("Service {} not found", key)).await,
            Err(e) => return self.reject(key, export, e.to_string()).await,
        };
        if service.meta().deletion_timestamp.is_some() {
            return self
                .reject(key, export, format!("Service {} is being deleted", key))
                .await;
        }
        let service_type = service.spec.as_ref().and_then(|s| s.type_.as_deref());
        if service_type == Some(EXTERNAL_NAME) {
            let message = format!("Type {} of Service {} cannot be exported", EXTERNAL_NAME, key);
            return self.reject(key, export, message).await;
        }

        let ingresses = self.store.list::<Ingress>().await?;
        if let Some(conflict) = find_path_conflict(&ingresses, &export) {
            return self.reject(key, export, conflict.to_string()).await;
        }

        let export = self.ensure_ingress(key, export).await?;
        self.set_valid(export, ConditionStatus::True, REASON_SUCCESS, String::new())
            .await?;
        Ok(ReconcileOutcome::Done)
    }

    fn watches(&self, controller: Controller<ServiceExport>, client: &Client) -> Controller<ServiceExport> {
        controller
            .owns(Api::<Ingress>::all(client.clone()), watcher::Config::default())
            .watches(
                Api::<Service>::all(client.clone()),
                watcher::Config::default(),
                |service: Service| -> Option<ObjectRef<ServiceExport>> {
                    let namespace = service.namespace()?;
                    Some(ObjectRef::new(&service.name_any()).within(&namespace))
                },
            )
    }
}
