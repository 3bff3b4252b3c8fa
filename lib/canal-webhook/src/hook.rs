//! Typed admission hooks

use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A rejected field and why
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    /// JSON path of the offending field, e.g. `spec.targets[1].weight`
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every problem found while validating one object
#[derive(Clone, Debug, Default, PartialEq, Eq, Error)]
#[error("{}", render(.0))]
pub struct ValidationErrors(pub Vec<FieldError>);

fn render(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `Ok` when nothing was recorded
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Whether any error was recorded against `field`
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

/// Defaulting and validation for one kind.
///
/// Defaulting must be idempotent: running `set_defaults` twice leaves the
/// object exactly as running it once.
pub trait AdmissionHook: Send + Sync + 'static {
    type Object: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Clone + Send + Sync;

    fn set_defaults(&self, _obj: &mut Self::Object) {}

    fn validate_create(&self, _obj: &Self::Object) -> Result<(), ValidationErrors> {
        Ok(())
    }

    fn validate_update(&self, _old: &Self::Object, _new: &Self::Object) -> Result<(), ValidationErrors> {
        Ok(())
    }

    fn validate_delete(&self, _obj: &Self::Object) -> Result<(), ValidationErrors> {
        Ok(())
    }
}
