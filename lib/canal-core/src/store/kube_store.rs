use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

use super::{ClusterObject, ClusterStore, NamespacedObject, StoreObject};
use crate::{CoreError, Result};

/// ClusterStore backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get the underlying Kubernetes client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn namespaced<K: NamespacedObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespace_of<K: NamespacedObject>(obj: &K) -> Result<String> {
        obj.namespace().ok_or_else(|| {
            CoreError::InvalidInput(format!("{} {} has no namespace", K::kind(&()), obj.name_any()))
        })
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get<K: NamespacedObject>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.namespaced::<K>(namespace).get_opt(name).await?)
    }

    async fn list<K: StoreObject>(&self) -> Result<Vec<K>> {
        let api: Api<K> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        debug!("Listed {} {} objects", list.items.len(), K::kind(&()));
        Ok(list.items)
    }

    async fn create<K: NamespacedObject>(&self, obj: &K) -> Result<K> {
        let namespace = Self::namespace_of(obj)?;
        Ok(self
            .namespaced::<K>(&namespace)
            .create(&PostParams::default(), obj)
            .await?)
    }

    async fn update<K: NamespacedObject>(&self, obj: &K) -> Result<K> {
        let namespace = Self::namespace_of(obj)?;
        Ok(self
            .namespaced::<K>(&namespace)
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await?)
    }

    async fn update_status<K: NamespacedObject>(&self, obj: &K) -> Result<K> {
        let namespace = Self::namespace_of(obj)?;
        let data = serde_json::to_vec(obj)?;
        Ok(self
            .namespaced::<K>(&namespace)
            .replace_status(&obj.name_any(), &PostParams::default(), data)
            .await?)
    }

    async fn delete<K: NamespacedObject>(&self, namespace: &str, name: &str) -> Result<()> {
        self.namespaced::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn get_cluster<K: ClusterObject>(&self, name: &str) -> Result<Option<K>> {
        let api: Api<K> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn create_cluster<K: ClusterObject>(&self, obj: &K) -> Result<K> {
        let api: Api<K> = Api::all(self.client.clone());
        Ok(api.create(&PostParams::default(), obj).await?)
    }

    async fn update_cluster<K: ClusterObject>(&self, obj: &K) -> Result<K> {
        let api: Api<K> = Api::all(self.client.clone());
        Ok(api
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await?)
    }
}
