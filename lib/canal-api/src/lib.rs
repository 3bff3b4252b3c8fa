//! Flomesh multi-cluster API types and CRDs for Kubernetes integration
//!
//! This library defines the custom resources reconciled and admitted by the
//! control plane:
//! - ServiceExport: exposes a local Service to the cluster set
//! - ServiceImport: makes a remote Service available locally
//! - GlobalTrafficPolicy: distributes traffic across exporting clusters
//! - Cluster, ProxyProfile, NamespacedIngress: admission-only kinds
//!
//! It also carries bindings to the Gateway API and cert-manager CRDs and
//! the well-known names shared by every component.

pub mod cert_manager;
pub mod gateway;
pub mod names;
pub mod v1alpha1;

pub use v1alpha1::{
    Cluster, ClusterKey, Condition, ConditionStatus, GlobalTrafficPolicy, NamespacedIngress,
    ProxyProfile, ServiceExport, ServiceImport, ServiceImportType,
};
