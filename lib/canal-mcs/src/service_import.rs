//! ServiceImport controller
//!
//! Each ClusterSetIP import is backed by a local ClusterIP Service of the
//! same name. The Service is created or adopted here; once the import has
//! IPs they are published on the Service's load balancer status.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, Service, ServicePort, ServiceSpec, ServiceStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::{watcher, Controller};
use tracing::{debug, info};

use canal_api::names::DERIVED_SERVICE_ANNOTATION;
use canal_api::{ServiceImport, ServiceImportType};
use canal_core::{ClusterStore, CoreError, ObjectKey, ReconcileOutcome, Reconciler, Result};

const CLUSTER_IP: &str = "ClusterIP";

/// Whether `owner` refers to the ServiceImport called `name`
pub fn names_import(owner: &OwnerReference, name: &str) -> bool {
    owner.api_version == ServiceImport::api_version(&()) && owner.kind == ServiceImport::kind(&()) && owner.name == name
}

fn mirror_ports(import: &ServiceImport) -> Vec<ServicePort> {
    import
        .spec
        .ports
        .iter()
        .map(|port| ServicePort {
            name: port.name.clone(),
            protocol: port.protocol.clone(),
            app_protocol: port.app_protocol.clone(),
            port: port.port,
            ..Default::default()
        })
        .collect()
}

/// The ClusterIP Service backing `import`
pub fn derived_service(import: &ServiceImport, owner: OwnerReference) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(import.name_any()),
            namespace: import.namespace(),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(CLUSTER_IP.to_string()),
            ports: Some(mirror_ports(import)),
            session_affinity: import.spec.session_affinity.clone(),
            ..Default::default()
        }),
        status: None,
    }
}

fn load_balancer_ingress(ips: &[String]) -> Vec<LoadBalancerIngress> {
    ips.iter()
        .map(|ip| LoadBalancerIngress {
            ip: Some(ip.clone()),
            ..Default::default()
        })
        .collect()
}

pub struct ServiceImportReconciler<S> {
    store: Arc<S>,
}

impl<S: ClusterStore> ServiceImportReconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create the derived Service, or attach the import to an existing one
    async fn create_or_adopt(&self, key: &ObjectKey, import: &ServiceImport) -> Result<Service> {
        let owner = import
            .controller_owner_ref(&())
            .ok_or_else(|| CoreError::Internal(format!("ServiceImport {} has no uid", key)))?;

        match self.store.create(&derived_service(import, owner)).await {
            Ok(service) => {
                info!(namespace = %key.namespace, name = %key.name, "Created derived Service");
                return Ok(service);
            }
            Err(CoreError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }

        let mut service = self
            .store
            .get::<Service>(&key.namespace, &key.name)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Service {}", key)))?;
        if service.owner_references().iter().any(|o| names_import(o, &key.name)) {
            return Ok(service);
        }

        let adopted = import
            .owner_ref(&())
            .ok_or_else(|| CoreError::Internal(format!("ServiceImport {} has no uid", key)))?;
        service.owner_references_mut().push(adopted);
        let service = self.store.update(&service).await?;
        info!(namespace = %key.namespace, name = %key.name, "Adopted existing Service");
        Ok(service)
    }
}

#[async_trait]
impl<S: ClusterStore> Reconciler for ServiceImportReconciler<S> {
    type Object = ServiceImport;

    fn name(&self) -> &'static str {
        "serviceimport"
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let Some(mut import) = self
            .store
            .get::<ServiceImport>(&key.namespace, &key.name)
            .await?
        else {
            return Ok(ReconcileOutcome::Done);
        };
        if import.meta().deletion_timestamp.is_some() {
            debug!(namespace = %key.namespace, name = %key.name, "ServiceImport is being deleted");
            return Ok(ReconcileOutcome::Done);
        }
        if import.spec.effective_type() != ServiceImportType::ClusterSetIP {
            debug!(namespace = %key.namespace, name = %key.name, "Skipping headless ServiceImport");
            return Ok(ReconcileOutcome::Done);
        }

        if import.annotations().get(DERIVED_SERVICE_ANNOTATION) != Some(&key.name) {
            import
                .annotations_mut()
                .insert(DERIVED_SERVICE_ANNOTATION.to_string(), key.name.clone());
            self.store.update(&import).await?;
            debug!(namespace = %key.namespace, name = %key.name, "Annotated ServiceImport");
            return Ok(ReconcileOutcome::Done);
        }

        let mut service = self.create_or_adopt(key, &import).await?;
        if import.spec.ips.is_empty() {
            return Ok(ReconcileOutcome::Done);
        }

        let ingress = load_balancer_ingress(&import.spec.ips);
        let current = service
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref());
        if current == Some(&ingress) {
            return Ok(ReconcileOutcome::Done);
        }

        service
            .status
            .get_or_insert_with(ServiceStatus::default)
            .load_balancer = Some(LoadBalancerStatus {
            ingress: Some(ingress),
        });
        self.store.update_status(&service).await?;
        info!(
            namespace = %key.namespace,
            name = %key.name,
            ips = ?import.spec.ips,
            "Published ServiceImport IPs"
        );
        Ok(ReconcileOutcome::Done)
    }

    fn watches(&self, controller: Controller<ServiceImport>, client: &Client) -> Controller<ServiceImport> {
        controller.owns(Api::<Service>::all(client.clone()), watcher::Config::default())
    }
}
