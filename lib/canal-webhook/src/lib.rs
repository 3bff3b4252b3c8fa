//! Admission webhooks for the mesh CRDs
//!
//! Every admitted kind has an [`AdmissionHook`] that defaults and validates
//! it. The [`HookRegistry`] serves them over HTTPS as AdmissionReview
//! endpoints, and [`configuration`] registers those endpoints with the API
//! server.

pub mod configuration;
pub mod hook;
pub mod hooks;
pub mod registry;
pub mod server;

pub use configuration::{register_configurations, WebhookTarget};
pub use hook::{AdmissionHook, FieldError, ValidationErrors};
pub use hooks::default_registry;
pub use registry::{HookDescriptor, HookMode, HookRegistry};
pub use server::{serve_admission, serve_metrics, tls_config, WebhookError};
