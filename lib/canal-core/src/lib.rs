//! Core plumbing shared by the canal controllers
//!
//! This library provides:
//! - Typed access to cluster objects, backed by the API server or memory
//! - The reconciler runtime and its per-key backoff
//! - Derived names, spec hashing and status condition helpers
//! - Process and mesh configuration
//! - Prometheus metrics

pub mod conditions;
pub mod config;
pub mod error;
pub mod metrics;
pub mod naming;
pub mod runtime;
pub mod store;

pub use config::{ControllerConfig, MeshConfig};
pub use error::{CoreError, Result};
pub use metrics::Metrics;
pub use naming::{derived_name, spec_hash};
pub use runtime::{Manager, ReconcileOutcome, Reconciler};
pub use store::{ClusterStore, KubeStore, MemoryStore, ObjectKey};
