//! Dispatch of admission reviews to typed hooks

use std::collections::HashMap;
use std::sync::Arc;

use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use serde_json::Value;
use tracing::{debug, warn};

use canal_core::Metrics;

use crate::hook::AdmissionHook;

/// Suffix of every registered webhook name
pub const WEBHOOK_NAME_SUFFIX: &str = "kb.flomesh.io";

/// Group/version/kind a hook admits, and the names it is served under
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookDescriptor {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
}

impl HookDescriptor {
    fn of<K: kube::Resource<DynamicType = ()>>() -> Self {
        Self {
            group: K::group(&()).into_owned(),
            version: K::version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            plural: K::plural(&()).into_owned(),
        }
    }

    fn path_suffix(&self) -> String {
        format!(
            "{}-{}-{}",
            self.group.replace('.', "-"),
            self.version,
            self.kind.to_lowercase()
        )
    }

    /// e.g. `/mutate-flomesh-io-v1alpha1-serviceexport`
    pub fn mutate_path(&self) -> String {
        format!("/mutate-{}", self.path_suffix())
    }

    /// e.g. `/validate--v1-configmap` for the core group
    pub fn validate_path(&self) -> String {
        format!("/validate-{}", self.path_suffix())
    }

    pub fn mutating_webhook_name(&self) -> String {
        format!("m{}.{}", self.kind.to_lowercase(), WEBHOOK_NAME_SUFFIX)
    }

    pub fn validating_webhook_name(&self) -> String {
        format!("v{}.{}", self.kind.to_lowercase(), WEBHOOK_NAME_SUFFIX)
    }
}

/// Which half of a hook a path is bound to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookMode {
    Mutate,
    Validate,
}

impl HookMode {
    fn as_str(&self) -> &'static str {
        match self {
            HookMode::Mutate => "mutate",
            HookMode::Validate => "validate",
        }
    }
}

/// A hook with its object type erased
trait ErasedHook: Send + Sync {
    fn descriptor(&self) -> &HookDescriptor;
    fn mutate(&self, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse;
    fn validate(&self, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse;
}

struct Typed<H: AdmissionHook> {
    hook: H,
    descriptor: HookDescriptor,
}

fn decode<K: serde::de::DeserializeOwned>(obj: &DynamicObject) -> Result<K, String> {
    serde_json::to_value(obj)
        .and_then(serde_json::from_value)
        .map_err(|e| format!("cannot decode {}: {}", obj.metadata.name.as_deref().unwrap_or(""), e))
}

impl<H: AdmissionHook> ErasedHook for Typed<H> {
    fn descriptor(&self) -> &HookDescriptor {
        &self.descriptor
    }

    fn mutate(&self, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let Some(obj) = &req.object else {
            return AdmissionResponse::from(req);
        };
        let raw = match serde_json::to_value(obj) {
            Ok(raw) => raw,
            Err(e) => return AdmissionResponse::from(req).deny(e.to_string()),
        };
        let mut typed: H::Object = match serde_json::from_value(raw.clone()) {
            Ok(typed) => typed,
            Err(e) => {
                return AdmissionResponse::from(req)
                    .deny(format!("cannot decode {}: {}", self.descriptor.kind, e))
            }
        };

        let before = serde_json::to_value(&typed);
        self.hook.set_defaults(&mut typed);
        let after = serde_json::to_value(&typed);
        let (before, after) = match (before, after) {
            (Ok(before), Ok(after)) => (before, after),
            (Err(e), _) | (_, Err(e)) => return AdmissionResponse::from(req).deny(e.to_string()),
        };

        let mut defaulted = raw.clone();
        carry_changes(&mut defaulted, &before, &after);
        let patch = json_patch::diff(&raw, &defaulted);
        if patch.0.is_empty() {
            return AdmissionResponse::from(req);
        }

        debug!(kind = %self.descriptor.kind, ops = patch.0.len(), "Defaulting object");
        match AdmissionResponse::from(req).with_patch(patch) {
            Ok(response) => response,
            Err(e) => AdmissionResponse::from(req).deny(format!("patch serialization error: {}", e)),
        }
    }

    fn validate(&self, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let result: Result<(), String> = match req.operation {
            Operation::Create => req
                .object
                .as_ref()
                .ok_or_else(|| "no object in create request".to_string())
                .and_then(decode::<H::Object>)
                .and_then(|obj| self.hook.validate_create(&obj).map_err(|e| e.to_string())),
            Operation::Update => {
                let old = req
                    .old_object
                    .as_ref()
                    .ok_or_else(|| "no old object in update request".to_string())
                    .and_then(decode::<H::Object>);
                let new = req
                    .object
                    .as_ref()
                    .ok_or_else(|| "no object in update request".to_string())
                    .and_then(decode::<H::Object>);
                old.and_then(|old| new.map(|new| (old, new)))
                    .and_then(|(old, new)| {
                        self.hook.validate_update(&old, &new).map_err(|e| e.to_string())
                    })
            }
            Operation::Delete => match req.old_object.as_ref() {
                Some(obj) => decode::<H::Object>(obj)
                    .and_then(|obj| self.hook.validate_delete(&obj).map_err(|e| e.to_string())),
                None => Ok(()),
            },
            Operation::Connect => Ok(()),
        };

        match result {
            Ok(()) => AdmissionResponse::from(req),
            Err(message) => AdmissionResponse::from(req).deny(message),
        }
    }
}

/// Carry the changes between `before` and `after` over to `target`,
/// leaving fields the typed model does not know about untouched
fn carry_changes(target: &mut Value, before: &Value, after: &Value) {
    if before == after {
        return;
    }
    match (target, before, after) {
        (Value::Object(target), Value::Object(before), Value::Object(after)) => {
            for (key, after_child) in after {
                let before_child = before.get(key).unwrap_or(&Value::Null);
                match target.get_mut(key) {
                    Some(target_child) => carry_changes(target_child, before_child, after_child),
                    None => {
                        target.insert(key.clone(), after_child.clone());
                    }
                }
            }
            for key in before.keys() {
                if !after.contains_key(key) {
                    target.remove(key);
                }
            }
        }
        (Value::Array(target), Value::Array(before), Value::Array(after)) => {
            for (i, after_child) in after.iter().enumerate() {
                let before_child = before.get(i).unwrap_or(&Value::Null);
                match target.get_mut(i) {
                    Some(target_child) => carry_changes(target_child, before_child, after_child),
                    None => target.push(after_child.clone()),
                }
            }
            if after.len() < before.len() {
                target.truncate(after.len());
            }
        }
        (target, _, after) => *target = after.clone(),
    }
}

/// Every registered hook, addressable by its webhook path
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn ErasedHook>>,
    routes: HashMap<String, (usize, HookMode)>,
    metrics: Option<Metrics>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: AdmissionHook>(mut self, hook: H) -> Self {
        let descriptor = HookDescriptor::of::<H::Object>();
        let index = self.hooks.len();
        self.routes.insert(descriptor.mutate_path(), (index, HookMode::Mutate));
        self.routes.insert(descriptor.validate_path(), (index, HookMode::Validate));
        self.hooks.push(Arc::new(Typed { hook, descriptor }));
        self
    }

    /// Count admission decisions in `metrics`
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn descriptors(&self) -> Vec<&HookDescriptor> {
        self.hooks.iter().map(|h| h.descriptor()).collect()
    }

    /// Descriptor and mode served at `path`
    pub fn route(&self, path: &str) -> Option<(&HookDescriptor, HookMode)> {
        self.routes
            .get(path)
            .map(|(index, mode)| (self.hooks[*index].descriptor(), *mode))
    }

    /// Answer one review posted to `path`; `None` when no hook serves it
    pub fn review(
        &self,
        path: &str,
        review: AdmissionReview<DynamicObject>,
    ) -> Option<AdmissionReview<DynamicObject>> {
        let (index, mode) = *self.routes.get(path)?;
        let hook = &self.hooks[index];

        let req: AdmissionRequest<DynamicObject> = match review.try_into() {
            Ok(req) => req,
            Err(e) => {
                warn!(path, error = %e, "Malformed admission review");
                return Some(AdmissionResponse::invalid(e.to_string()).into_review());
            }
        };

        let response = match mode {
            HookMode::Mutate => hook.mutate(&req),
            HookMode::Validate => hook.validate(&req),
        };

        let operation = format!("{:?}", req.operation).to_uppercase();
        if !response.allowed {
            debug!(
                uid = %req.uid,
                kind = %hook.descriptor().kind,
                name = %req.name,
                reason = %response.result.message,
                "Admission denied"
            );
        }
        if let Some(metrics) = &self.metrics {
            let hook_name = format!("{}-{}", mode.as_str(), hook.descriptor().kind.to_lowercase());
            metrics.record_admission(&hook_name, &operation, response.allowed);
        }

        Some(response.into_review())
    }
}
