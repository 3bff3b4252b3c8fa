//! Issuer that delegates signing to cert-manager
//!
//! Bootstrap creates a self-signed `Issuer`, a CA `Certificate` issued by it
//! into the CA bundle secret, and a CA-backed `Issuer` over that secret.
//! Leaves are requested through short-lived `CertificateRequest` objects.

use async_trait::async_trait;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use rcgen::{CertificateParams, DistinguishedName, DnType, DnValue};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use canal_api::cert_manager::{
    CaIssuer, Certificate as CmCertificate, CertificatePrivateKey, CertificateRequest,
    CertificateRequestSpec, CertificateSpec, Issuer, IssuerSpec, ObjectReference, SelfSignedIssuer,
};
use canal_core::config::CertManagerConfig;
use canal_core::ClusterStore;

use crate::archon::RootCaSettings;
use crate::certificate::{generate_rsa_key, Certificate, RSA_KEY_BITS};
use crate::persist::{self, SecretKeys};
use crate::{CertificateIssuer, PkiError, Result};

pub const CERT_MANAGER_GROUP: &str = "cert-manager.io";

/// Cadence and deadline of readiness polls
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Poll `check` until it yields a value or the deadline passes
async fn poll_until<T, F, Fut>(poll: PollSettings, what: &str, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let polling = async {
        loop {
            if let Some(value) = check().await? {
                return Ok(value);
            }
            tokio::time::sleep(poll.interval).await;
        }
    };
    tokio::time::timeout(poll.timeout, polling)
        .await
        .map_err(|_| PkiError::TimeoutIssuing(what.to_string()))?
}

fn issuer_ref(name: &str) -> ObjectReference {
    ObjectReference {
        name: name.to_string(),
        kind: Some("Issuer".to_string()),
        group: Some(CERT_MANAGER_GROUP.to_string()),
    }
}

fn metadata(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

/// Go duration string understood by cert-manager
fn go_duration(d: Duration) -> String {
    format!("{}s", d.as_secs())
}

/// Create an object, treating an existing one as success
async fn ensure_created<S, K>(store: &S, obj: &K) -> Result<()>
where
    S: ClusterStore,
    K: canal_core::store::NamespacedObject,
{
    match store.create(obj).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Issuer backed by cert-manager
pub struct CertManagerIssuer<S> {
    store: Arc<S>,
    namespace: String,
    config: CertManagerConfig,
    poll: PollSettings,
    root: Arc<Certificate>,
}

impl<S: ClusterStore> CertManagerIssuer<S> {
    /// Create the issuer chain and wait for the CA certificate to be ready
    pub async fn bootstrap(
        store: Arc<S>,
        namespace: &str,
        config: CertManagerConfig,
        root: RootCaSettings,
        poll: PollSettings,
    ) -> Result<Self> {
        let self_signed = Issuer {
            metadata: metadata(namespace, &config.self_signed_issuer_name),
            spec: IssuerSpec {
                self_signed: Some(SelfSignedIssuer {}),
                ca: None,
            },
            status: None,
        };
        ensure_created(store.as_ref(), &self_signed).await?;

        let ca_certificate = CmCertificate {
            metadata: metadata(namespace, &config.ca_certificate_name),
            spec: CertificateSpec {
                secret_name: persist::secret_name().to_string(),
                common_name: root.common_name.clone(),
                duration: Some(go_duration(root.validity)),
                is_ca: true,
                dns_names: Vec::new(),
                issuer_ref: issuer_ref(&config.self_signed_issuer_name),
                private_key: Some(CertificatePrivateKey {
                    algorithm: "RSA".to_string(),
                    size: RSA_KEY_BITS as u32,
                }),
                usages: vec!["cert sign".to_string(), "crl sign".to_string()],
            },
            status: None,
        };
        ensure_created(store.as_ref(), &ca_certificate).await?;

        let ca_name = config.ca_certificate_name.clone();
        poll_until(poll, &format!("Certificate {}/{}", namespace, ca_name), || {
            let store = store.clone();
            let ca_name = ca_name.clone();
            async move {
                let cert: Option<CmCertificate> = store.get(namespace, &ca_name).await?;
                Ok(cert.filter(|c| c.is_ready()).map(|_| ()))
            }
        })
        .await?;
        debug!("CA Certificate {}/{} is ready", namespace, ca_name);

        let ca_issuer = Issuer {
            metadata: metadata(namespace, &config.ca_issuer_name),
            spec: IssuerSpec {
                self_signed: None,
                ca: Some(CaIssuer {
                    secret_name: persist::secret_name().to_string(),
                }),
            },
            status: None,
        };
        ensure_created(store.as_ref(), &ca_issuer).await?;

        let root = persist::load_root(store.as_ref(), namespace, SecretKeys::TLS)
            .await?
            .ok_or_else(|| {
                PkiError::InvalidSecret(format!(
                    "Certificate {} is ready but secret {}/{} is missing",
                    ca_name,
                    namespace,
                    persist::secret_name()
                ))
            })?;
        info!(serial = %root.serial_number, "Root CA issued by cert-manager");

        Ok(Self {
            store,
            namespace: namespace.to_string(),
            config,
            poll,
            root: Arc::new(root),
        })
    }

    async fn delete_request(&self, name: &str) {
        match self
            .store
            .delete::<CertificateRequest>(&self.namespace, name)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!("Failed to delete CertificateRequest {}/{}: {}", self.namespace, name, e),
        }
    }
}

fn signing_request(common_name: &str, dns_names: &[String]) -> Result<(String, String)> {
    let mut params = CertificateParams::new(dns_names.to_vec())
        .map_err(|e| PkiError::CertificateGeneration(format!("invalid DNS names: {}", e)))?;
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    params.distinguished_name = dn;

    let (key, key_pem) = generate_rsa_key()?;
    let csr = params
        .serialize_request(&key)
        .and_then(|csr| csr.pem())
        .map_err(|e| PkiError::CertificateGeneration(format!("failed to create CSR: {}", e)))?;
    Ok((csr, key_pem))
}

#[async_trait]
impl<S: ClusterStore> CertificateIssuer for CertManagerIssuer<S> {
    fn name(&self) -> &'static str {
        "cert-manager"
    }

    async fn issue_certificate(
        &self,
        common_name: &str,
        validity: Duration,
        dns_names: &[String],
    ) -> Result<Certificate> {
        let (csr, key_pem) = {
            let common_name = common_name.to_string();
            let dns_names = dns_names.to_vec();
            tokio::task::spawn_blocking(move || signing_request(&common_name, &dns_names))
                .await
                .map_err(|e| PkiError::KeyGeneration(format!("key generation task failed: {}", e)))??
        };

        let name = format!("canal-{}", Uuid::new_v4());
        let request = CertificateRequest {
            metadata: metadata(&self.namespace, &name),
            spec: CertificateRequestSpec {
                request: ByteString(csr.into_bytes()),
                is_ca: false,
                duration: Some(go_duration(validity)),
                usages: vec![
                    "digital signature".to_string(),
                    "key encipherment".to_string(),
                    "server auth".to_string(),
                    "client auth".to_string(),
                ],
                issuer_ref: issuer_ref(&self.config.ca_issuer_name),
            },
            status: None,
        };
        self.store.create(&request).await?;
        debug!("Created CertificateRequest {}/{} for {}", self.namespace, name, common_name);

        let store = self.store.clone();
        let namespace = self.namespace.clone();
        let issued = poll_until(
            self.poll,
            &format!("CertificateRequest {}/{}", self.namespace, name),
            || {
                let store = store.clone();
                let namespace = namespace.clone();
                let name = name.clone();
                async move {
                    let request: Option<CertificateRequest> = store.get(&namespace, &name).await?;
                    Ok(request
                        .filter(|r| r.is_ready())
                        .and_then(|r| r.status)
                        .and_then(|status| status.certificate.map(|c| (c, status.ca))))
                }
            },
        )
        .await;

        self.delete_request(&name).await;
        let (cert, ca) = issued?;

        let cert_pem = String::from_utf8(cert.0)
            .map_err(|_| PkiError::Parse(format!("CertificateRequest {} returned non-UTF-8 data", name)))?;
        let ca_bundle = ca
            .and_then(|ca| String::from_utf8(ca.0).ok())
            .unwrap_or_else(|| self.root.cert_pem.clone());
        Certificate::from_pem(&cert_pem, &key_pem, &ca_bundle)
    }

    async fn root_certificate(&self) -> Result<Certificate> {
        Ok(self.root.as_ref().clone())
    }
}
