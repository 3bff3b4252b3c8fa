//! Multi-cluster service reconcilers
//!
//! - [`ServiceExportReconciler`]: publishes exported Services through a generated ingress
//! - [`ServiceImportReconciler`]: backs ClusterSetIP imports with a local Service
//! - [`ServiceReconciler`]: copies the derived Service's cluster IP into its import
//! - [`EndpointSliceReconciler`]: labels multi-cluster slices with the derived Service name

pub mod endpoint_slice;
pub mod ingress;
pub mod service;
pub mod service_export;
pub mod service_import;

use std::sync::Arc;

use tracing::info;

use canal_core::{ClusterStore, Manager, MeshConfig};

pub use endpoint_slice::EndpointSliceReconciler;
pub use service::ServiceReconciler;
pub use service_export::ServiceExportReconciler;
pub use service_import::ServiceImportReconciler;

/// Register every multi-cluster reconciler with `manager`.
///
/// The ServiceExport reconciler only runs when ingress is enabled in the
/// mesh config.
pub fn setup_with_manager<S: ClusterStore>(manager: Manager, store: Arc<S>, mesh_config: &MeshConfig) -> Manager {
    let manager = if mesh_config.ingress.enabled {
        manager.register(ServiceExportReconciler::new(
            store.clone(),
            mesh_config.ingress.class_name.clone(),
        ))
    } else {
        info!("Ingress is disabled, not exporting services");
        manager
    };

    manager
        .register(ServiceImportReconciler::new(store.clone()))
        .register(ServiceReconciler::new(store.clone()))
        .register(EndpointSliceReconciler::new(store))
}
