use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{ClusterObject, ClusterStore, NamespacedObject, StoreObject};
use crate::{CoreError, Result};

/// (apiVersion/kind, namespace, name)
type StoreKey = (String, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<StoreKey, Value>,
    resource_version: u64,
}

impl State {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

/// In-memory ClusterStore with the API server's write semantics.
///
/// Creates assign uid, generation and resource version. Updates are
/// rejected with `Conflict` when the caller's resource version is stale,
/// `update` never writes status and `update_status` never writes anything
/// else. Listing order is stable: by namespace, then name.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn type_key<K: Resource<DynamicType = ()>>() -> String {
    format!("{}/{}", K::api_version(&()), K::kind(&()))
}

fn describe<K: Resource<DynamicType = ()>>(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        format!("{} {}", K::kind(&()), name)
    } else {
        format!("{} {}/{}", K::kind(&()), namespace, name)
    }
}

fn resource_version_of(value: &Value) -> Option<&str> {
    value
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects of a kind
    pub fn count<K: StoreObject>(&self) -> usize {
        let kind = type_key::<K>();
        self.lock()
            .map(|state| state.objects.keys().filter(|(t, _, _)| *t == kind).count())
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| CoreError::Internal("store lock poisoned".to_string()))
    }

    fn key_of<K: StoreObject>(obj: &K) -> StoreKey {
        (type_key::<K>(), obj.namespace().unwrap_or_default(), obj.name_any())
    }

    fn read<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let state = self.lock()?;
        let key = (type_key::<K>(), namespace.to_string(), name.to_string());
        match state.objects.get(&key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    fn insert<K: StoreObject>(&self, obj: &K) -> Result<K> {
        let key = Self::key_of(obj);
        let mut state = self.lock()?;
        if state.objects.contains_key(&key) {
            return Err(CoreError::AlreadyExists(format!(
                "{} already exists",
                describe::<K>(&key.1, &key.2)
            )));
        }

        let mut value = serde_json::to_value(obj)?;
        let version = state.next_version();
        let meta = &mut value["metadata"];
        meta["resourceVersion"] = Value::String(version);
        meta["generation"] = Value::from(1);
        if meta.get("uid").map_or(true, Value::is_null) {
            meta["uid"] = Value::String(uuid::Uuid::new_v4().to_string());
        }

        state.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    /// Write `obj` over the stored copy. A status write takes only the
    /// status from `obj`; any other write takes everything but the status.
    fn replace<K: StoreObject>(&self, obj: &K, status_only: bool) -> Result<K> {
        let key = Self::key_of(obj);
        let mut state = self.lock()?;
        let stored = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(describe::<K>(&key.1, &key.2)))?;

        let incoming = serde_json::to_value(obj)?;
        if let Some(version) = resource_version_of(&incoming) {
            if Some(version) != resource_version_of(&stored) {
                return Err(CoreError::Conflict(format!(
                    "the object {} has been modified; please apply your changes to the latest version",
                    describe::<K>(&key.1, &key.2)
                )));
            }
        }

        let mut next = if status_only {
            let mut next = stored.clone();
            match incoming.get("status") {
                Some(status) => next["status"] = status.clone(),
                None => {
                    if let Some(map) = next.as_object_mut() {
                        map.remove("status");
                    }
                }
            }
            next
        } else {
            let mut next = incoming;
            match stored.get("status") {
                Some(status) => next["status"] = status.clone(),
                None => {
                    if let Some(map) = next.as_object_mut() {
                        map.remove("status");
                    }
                }
            }
            let generation = stored
                .pointer("/metadata/generation")
                .and_then(Value::as_i64)
                .unwrap_or(1);
            let bumped = if next.get("spec") != stored.get("spec") {
                generation + 1
            } else {
                generation
            };
            next["metadata"]["generation"] = Value::from(bumped);
            next["metadata"]["uid"] = stored["metadata"]["uid"].clone();
            next
        };

        next["metadata"]["resourceVersion"] = Value::String(state.next_version());
        state.objects.insert(key, next.clone());
        Ok(serde_json::from_value(next)?)
    }

    fn remove<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.lock()?;
        let key = (type_key::<K>(), namespace.to_string(), name.to_string());
        state
            .objects
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(describe::<K>(namespace, name)))
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get<K: NamespacedObject>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        self.read(namespace, name)
    }

    async fn list<K: StoreObject>(&self) -> Result<Vec<K>> {
        let state = self.lock()?;
        let kind = type_key::<K>();
        state
            .objects
            .iter()
            .filter(|((t, _, _), _)| *t == kind)
            .map(|(_, value)| serde_json::from_value(value.clone()).map_err(CoreError::from))
            .collect()
    }

    async fn create<K: NamespacedObject>(&self, obj: &K) -> Result<K> {
        if obj.namespace().is_none() {
            return Err(CoreError::InvalidInput(format!(
                "{} {} has no namespace",
                K::kind(&()),
                obj.name_any()
            )));
        }
        self.insert(obj)
    }

    async fn update<K: NamespacedObject>(&self, obj: &K) -> Result<K> {
        self.replace(obj, false)
    }

    async fn update_status<K: NamespacedObject>(&self, obj: &K) -> Result<K> {
        self.replace(obj, true)
    }

    async fn delete<K: NamespacedObject>(&self, namespace: &str, name: &str) -> Result<()> {
        self.remove::<K>(namespace, name)
    }

    async fn get_cluster<K: ClusterObject>(&self, name: &str) -> Result<Option<K>> {
        self.read("", name)
    }

    async fn create_cluster<K: ClusterObject>(&self, obj: &K) -> Result<K> {
        self.insert(obj)
    }

    async fn update_cluster<K: ClusterObject>(&self, obj: &K) -> Result<K> {
        self.replace(obj, false)
    }
}
