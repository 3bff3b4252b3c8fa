//! Typed access to the cluster's object store
//!
//! Reconcilers and the PKI never talk to the API server directly; they go
//! through [`ClusterStore`] so they can run against a real cluster
//! ([`KubeStore`]) or against [`MemoryStore`] in tests. Writes carry the
//! object's resource version and fail with `Conflict` when it is stale.

mod kube_store;
mod memory;

pub use kube_store::KubeStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use kube::core::{ClusterResourceScope, NamespaceResourceScope};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

use crate::Result;

/// Any typed object the store can hold
pub trait StoreObject:
    Resource<DynamicType = ()> + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = ()>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// A namespaced object
pub trait NamespacedObject: StoreObject + Resource<Scope = NamespaceResourceScope> {}

impl<K> NamespacedObject for K where K: StoreObject + Resource<Scope = NamespaceResourceScope> {}

/// A cluster-scoped object
pub trait ClusterObject: StoreObject + Resource<Scope = ClusterResourceScope> {}

impl<K> ClusterObject for K where K: StoreObject + Resource<Scope = ClusterResourceScope> {}

/// Namespace/name coordinates of an object
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing object; cluster-scoped objects get an empty namespace
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Typed get/list/create/update/delete over the cluster's objects
#[async_trait]
pub trait ClusterStore: Send + Sync + 'static {
    /// Fetch a namespaced object; `None` when it does not exist
    async fn get<K: NamespacedObject>(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// List every object of a kind across all namespaces, in a stable order
    async fn list<K: StoreObject>(&self) -> Result<Vec<K>>;

    /// Create a namespaced object; `AlreadyExists` if the name is taken
    async fn create<K: NamespacedObject>(&self, obj: &K) -> Result<K>;

    /// Replace spec and metadata of a namespaced object. Status is not written.
    async fn update<K: NamespacedObject>(&self, obj: &K) -> Result<K>;

    /// Replace the status of a namespaced object. Spec is not written.
    async fn update_status<K: NamespacedObject>(&self, obj: &K) -> Result<K>;

    /// Delete a namespaced object
    async fn delete<K: NamespacedObject>(&self, namespace: &str, name: &str) -> Result<()>;

    /// Fetch a cluster-scoped object
    async fn get_cluster<K: ClusterObject>(&self, name: &str) -> Result<Option<K>>;

    /// Create a cluster-scoped object
    async fn create_cluster<K: ClusterObject>(&self, obj: &K) -> Result<K>;

    /// Replace a cluster-scoped object
    async fn update_cluster<K: ClusterObject>(&self, obj: &K) -> Result<K>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::new("a", "s").to_string(), "a/s");
        assert_eq!(ObjectKey::new("", "cluster-wide").to_string(), "cluster-wide");
    }

    #[test]
    fn test_object_key_of_resource() {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("cfg".to_string()),
                namespace: Some("flomesh".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(ObjectKey::of(&cm), ObjectKey::new("flomesh", "cfg"));
    }
}
