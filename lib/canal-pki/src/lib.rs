//! Certificate authority for the mesh
//!
//! Three interchangeable issuers sit behind [`CertificateIssuer`]:
//! - [`ArchonIssuer`] generates and persists its own root CA
//! - [`ManualIssuer`] signs with a root CA supplied by the operator
//! - [`CertManagerIssuer`] delegates signing to cert-manager
//!
//! [`CertificateManager`] picks one from the mesh config at startup and
//! caches the leaves it issues.

pub mod archon;
pub mod cert_manager;
pub mod certificate;
pub mod error;
pub mod manager;
pub mod manual;
pub mod persist;

pub use archon::{ArchonIssuer, RootCaSettings};
pub use cert_manager::{CertManagerIssuer, PollSettings};
pub use certificate::Certificate;
pub use error::{PkiError, Result};
pub use manager::{CertificateManager, IssuerSelection};
pub use manual::ManualIssuer;

use async_trait::async_trait;
use std::time::Duration;

/// Operations every issuer supports
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Issue a leaf certificate valid for `validity` from now
    async fn issue_certificate(
        &self,
        common_name: &str,
        validity: Duration,
        dns_names: &[String],
    ) -> Result<Certificate>;

    /// The root CA leaves are verified against
    async fn root_certificate(&self) -> Result<Certificate>;

    /// Replace the root CA, persisting the new one
    async fn rotate_root(&self) -> Result<Certificate> {
        Err(PkiError::RotationUnsupported(self.name()))
    }
}
