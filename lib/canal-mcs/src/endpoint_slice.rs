//! Points multi-cluster EndpointSlices at their derived Service
//!
//! A slice labelled with a multi-cluster service name belongs to the derived
//! Service for that name. Only the standard `kubernetes.io/service-name`
//! label is rewritten: the multi-cluster label keeps the source name, so
//! the derived name is recomputed from the same input on every pass.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::{Resource, ResourceExt};
use tracing::info;

use canal_api::names::{MULTICLUSTER_SERVICE_NAME_LABEL, SERVICE_NAME_LABEL};
use canal_core::{derived_name, ClusterStore, ObjectKey, ReconcileOutcome, Reconciler, Result};

pub struct EndpointSliceReconciler<S> {
    store: Arc<S>,
}

impl<S: ClusterStore> EndpointSliceReconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: ClusterStore> Reconciler for EndpointSliceReconciler<S> {
    type Object = EndpointSlice;

    fn name(&self) -> &'static str {
        "endpointslice"
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let Some(mut slice) = self
            .store
            .get::<EndpointSlice>(&key.namespace, &key.name)
            .await?
        else {
            return Ok(ReconcileOutcome::Done);
        };
        if slice.meta().deletion_timestamp.is_some() {
            return Ok(ReconcileOutcome::Done);
        }
        let Some(service_name) = slice.labels().get(MULTICLUSTER_SERVICE_NAME_LABEL).cloned() else {
            return Ok(ReconcileOutcome::Done);
        };

        let target = derived_name(&key.namespace, &service_name);
        if slice.labels().get(SERVICE_NAME_LABEL) == Some(&target) {
            return Ok(ReconcileOutcome::Done);
        }

        slice
            .labels_mut()
            .insert(SERVICE_NAME_LABEL.to_string(), target.clone());
        self.store.update(&slice).await?;
        info!(
            namespace = %key.namespace,
            name = %key.name,
            service = %target,
            "Relabelled EndpointSlice"
        );
        Ok(ReconcileOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canal_core::MemoryStore;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn slice(labels: &[(&str, &str)]) -> EndpointSlice {
        EndpointSlice {
            metadata: ObjectMeta {
                name: Some("s-abc12".to_string()),
                namespace: Some("a".to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            address_type: "IPv4".to_string(),
            endpoints: Vec::new(),
            ports: None,
        }
    }

    #[tokio::test]
    async fn test_labels_point_at_derived_service() {
        let store = Arc::new(MemoryStore::new());
        store
            .create(&slice(&[(MULTICLUSTER_SERVICE_NAME_LABEL, "s"), (SERVICE_NAME_LABEL, "s")]))
            .await
            .unwrap();

        EndpointSliceReconciler::new(store.clone())
            .reconcile(&ObjectKey::new("a", "s-abc12"))
            .await
            .unwrap();

        let stored: EndpointSlice = store.get("a", "s-abc12").await.unwrap().unwrap();
        assert_eq!(stored.labels()[SERVICE_NAME_LABEL], derived_name("a", "s"));
        assert_eq!(stored.labels()[MULTICLUSTER_SERVICE_NAME_LABEL], "s");
    }

    #[tokio::test]
    async fn test_unlabelled_slice_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let created = store.create(&slice(&[(SERVICE_NAME_LABEL, "s")])).await.unwrap();

        EndpointSliceReconciler::new(store.clone())
            .reconcile(&ObjectKey::new("a", "s-abc12"))
            .await
            .unwrap();

        let stored: EndpointSlice = store.get("a", "s-abc12").await.unwrap().unwrap();
        assert_eq!(stored.resource_version(), created.resource_version());
        assert_eq!(stored.labels()[SERVICE_NAME_LABEL], "s");
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        store
            .create(&slice(&[(MULTICLUSTER_SERVICE_NAME_LABEL, "s")]))
            .await
            .unwrap();
        let reconciler = EndpointSliceReconciler::new(store.clone());
        let key = ObjectKey::new("a", "s-abc12");

        reconciler.reconcile(&key).await.unwrap();
        let first: EndpointSlice = store.get("a", "s-abc12").await.unwrap().unwrap();
        reconciler.reconcile(&key).await.unwrap();
        let second: EndpointSlice = store.get("a", "s-abc12").await.unwrap().unwrap();
        assert_eq!(first.resource_version(), second.resource_version());
    }
}
