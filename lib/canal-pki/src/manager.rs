//! Front door to the mesh PKI

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use canal_core::config::{CertificateManagerKind, MeshConfig};
use canal_core::ClusterStore;

use crate::archon::{ArchonIssuer, RootCaSettings};
use crate::cert_manager::{CertManagerIssuer, PollSettings};
use crate::certificate::Certificate;
use crate::manual::ManualIssuer;
use crate::{CertificateIssuer, PkiError, Result};

/// Share of a certificate's validity before expiry at which it is reissued
pub const RENEWAL_FRACTION: u32 = 10;

/// Which issuer implementation is active; fixed for the process lifetime
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssuerSelection {
    Manual,
    SelfManaged,
    External,
}

impl From<CertificateManagerKind> for IssuerSelection {
    fn from(kind: CertificateManagerKind) -> Self {
        match kind {
            CertificateManagerKind::Manual => IssuerSelection::Manual,
            CertificateManagerKind::Archon => IssuerSelection::SelfManaged,
            CertificateManagerKind::CertManager => IssuerSelection::External,
        }
    }
}

/// A cached leaf and the DNS names it was issued for, sorted
#[derive(Clone)]
struct CachedLeaf {
    dns_names: Vec<String>,
    cert: Certificate,
}

fn sorted_names(dns_names: &[String]) -> Vec<String> {
    let mut names = dns_names.to_vec();
    names.sort();
    names.dedup();
    names
}

/// Issues and caches leaf certificates through the selected issuer
pub struct CertificateManager {
    issuer: Arc<dyn CertificateIssuer>,
    selection: IssuerSelection,
    service_validity: Duration,
    cache: RwLock<HashMap<String, CachedLeaf>>,
}

impl CertificateManager {
    pub fn new(
        issuer: Arc<dyn CertificateIssuer>,
        selection: IssuerSelection,
        service_validity: Duration,
    ) -> Self {
        Self {
            issuer,
            selection,
            service_validity,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Bootstrap the issuer named by the mesh config
    pub async fn from_config<S: ClusterStore>(
        store: Arc<S>,
        namespace: &str,
        config: &MeshConfig,
    ) -> Result<Self> {
        let selection = IssuerSelection::from(config.certificate.manager);
        let service_validity = config.certificate.service_validity()?;
        let root_settings = RootCaSettings::from_mesh_config(config)?;

        let issuer: Arc<dyn CertificateIssuer> = match selection {
            IssuerSelection::Manual => Arc::new(ManualIssuer::load(store.as_ref(), namespace).await?),
            IssuerSelection::SelfManaged => {
                Arc::new(ArchonIssuer::bootstrap(store, namespace, root_settings).await?)
            }
            IssuerSelection::External => Arc::new(
                CertManagerIssuer::bootstrap(
                    store,
                    namespace,
                    config.certificate.cert_manager.clone(),
                    root_settings,
                    PollSettings::default(),
                )
                .await?,
            ),
        };
        info!(issuer = issuer.name(), "Certificate manager ready");

        Ok(Self::new(issuer, selection, service_validity))
    }

    pub fn selection(&self) -> IssuerSelection {
        self.selection
    }

    /// Default lifetime of service certificates
    pub fn service_validity(&self) -> Duration {
        self.service_validity
    }

    /// Issue a leaf for `common_name`, reusing a cached one for the same DNS
    /// names that is not near expiry
    pub async fn issue_certificate(
        &self,
        common_name: &str,
        validity: Duration,
        dns_names: &[String],
    ) -> Result<Certificate> {
        let window = validity / RENEWAL_FRACTION;
        let names = sorted_names(dns_names);
        if let Some(cached) = self.cached(common_name) {
            if cached.dns_names != names {
                debug!(common_name, "Cached certificate has different DNS names");
            } else if cached.cert.expires_within(window, Utc::now()) {
                debug!(common_name, "Cached certificate is due for renewal");
            } else {
                debug!(common_name, "Using cached certificate");
                return Ok(cached.cert);
            }
        }

        let cert = self
            .issuer
            .issue_certificate(common_name, validity, dns_names)
            .await?;
        self.cache.write().unwrap_or_else(|e| e.into_inner()).insert(
            common_name.to_string(),
            CachedLeaf {
                dns_names: names,
                cert: cert.clone(),
            },
        );
        Ok(cert)
    }

    /// A previously issued, unexpired certificate for `common_name`
    pub fn get_certificate(&self, common_name: &str) -> Result<Certificate> {
        self.cached(common_name)
            .map(|leaf| leaf.cert)
            .filter(|cert| !cert.is_expired_at(Utc::now()))
            .ok_or_else(|| PkiError::CertificateNotFound(common_name.to_string()))
    }

    pub async fn root_certificate(&self) -> Result<Certificate> {
        self.issuer.root_certificate().await
    }

    /// Replace the root CA and drop every leaf signed by the old one
    pub async fn rotate_root(&self) -> Result<Certificate> {
        let root = self.issuer.rotate_root().await?;
        self.cache.write().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(root)
    }

    fn cached(&self, common_name: &str) -> Option<CachedLeaf> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(common_name)
            .cloned()
    }
}
