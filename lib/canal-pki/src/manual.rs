//! Issuer backed by an operator-supplied root CA

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use canal_core::{ClusterStore, CoreError};

use crate::archon::issue_leaf_blocking;
use crate::certificate::Certificate;
use crate::persist::{self, SecretKeys};
use crate::{CertificateIssuer, PkiError, Result};

/// Signs leaves with a root CA the operator placed in the CA bundle secret
pub struct ManualIssuer {
    root: Arc<Certificate>,
}

impl ManualIssuer {
    pub async fn load<S: ClusterStore>(store: &S, namespace: &str) -> Result<Self> {
        let root = persist::load_root(store, namespace, SecretKeys::CA)
            .await?
            .ok_or_else(|| {
                PkiError::Store(CoreError::NotFound(format!(
                    "secret {}/{} with a user-provided root CA",
                    namespace,
                    persist::secret_name()
                )))
            })?;
        info!(serial = %root.serial_number, "Loaded user-provided root CA");
        Ok(Self {
            root: Arc::new(root),
        })
    }
}

#[async_trait]
impl CertificateIssuer for ManualIssuer {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn issue_certificate(
        &self,
        common_name: &str,
        validity: Duration,
        dns_names: &[String],
    ) -> Result<Certificate> {
        issue_leaf_blocking(self.root.clone(), common_name, validity, dns_names).await
    }

    async fn root_certificate(&self) -> Result<Certificate> {
        Ok(self.root.as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archon::{new_root_ca, RootCaSettings};
    use canal_core::MemoryStore;

    #[tokio::test]
    async fn test_missing_secret_is_not_found() {
        let store = MemoryStore::new();
        let result = ManualIssuer::load(&store, "flomesh").await;
        assert!(matches!(result, Err(PkiError::Store(CoreError::NotFound(_)))));
    }

    #[tokio::test]
    async fn test_issues_with_provided_root() {
        let store = MemoryStore::new();
        let root = new_root_ca(&RootCaSettings {
            common_name: "operator-ca".to_string(),
            validity: Duration::from_secs(24 * 3600),
            country: "US".to_string(),
            locality: "Seattle".to_string(),
            organization: "example".to_string(),
        })
        .unwrap();
        persist::save_root(&store, "flomesh", SecretKeys::CA, &root).await.unwrap();

        let issuer = ManualIssuer::load(&store, "flomesh").await.unwrap();
        assert_eq!(issuer.root_certificate().await.unwrap().common_name, "operator-ca");

        let leaf = issuer
            .issue_certificate("svc.ns.svc", Duration::from_secs(3600), &[])
            .await
            .unwrap();
        assert_eq!(leaf.ca_bundle, root.cert_pem);
        assert!(matches!(
            issuer.rotate_root().await,
            Err(PkiError::RotationUnsupported("manual"))
        ));
    }
}
