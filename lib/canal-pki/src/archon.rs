//! Self-managed issuer
//!
//! The controller generates its own RSA root CA, keeps it in the CA bundle
//! secret, and signs leaf certificates with it in process.

use async_trait::async_trait;
use rand::RngCore;
use rcgen::{
    string::{Ia5String, PrintableString},
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyUsagePurpose, SanType, SerialNumber,
};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::info;

use canal_core::config::MeshConfig;
use canal_core::ClusterStore;

use crate::certificate::{generate_rsa_key, validity_from_now, Certificate};
use crate::persist::{self, SecretKeys};
use crate::{CertificateIssuer, PkiError, Result};

/// Width of generated serial numbers; every serial is below 2^128
pub const SERIAL_NUMBER_BYTES: usize = 16;

/// Subject and lifetime of a generated root CA
#[derive(Clone, Debug, PartialEq)]
pub struct RootCaSettings {
    pub common_name: String,
    pub validity: Duration,
    pub country: String,
    pub locality: String,
    pub organization: String,
}

impl RootCaSettings {
    pub fn from_mesh_config(config: &MeshConfig) -> Result<Self> {
        let subject = &config.certificate.ca_subject;
        Ok(Self {
            common_name: subject.common_name.clone(),
            validity: config.certificate.root_validity()?,
            country: subject.country.clone(),
            locality: subject.locality.clone(),
            organization: subject.organization.clone(),
        })
    }
}

fn random_serial_bytes() -> Vec<u8> {
    let mut bytes = [0u8; SERIAL_NUMBER_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    // positive and minimally encoded
    bytes[0] &= 0x7f;
    if bytes[0] == 0 {
        bytes[0] = 1;
    }
    bytes.to_vec()
}

/// Generate a self-signed RSA root CA
pub fn new_root_ca(settings: &RootCaSettings) -> Result<Certificate> {
    root_ca_with_serial(settings, random_serial_bytes())
}

fn root_ca_with_serial(settings: &RootCaSettings, serial: Vec<u8>) -> Result<Certificate> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(settings.common_name.clone()),
    );
    let country = PrintableString::try_from(settings.country.clone()).map_err(|e| {
        PkiError::CertificateGeneration(format!("invalid country '{}': {}", settings.country, e))
    })?;
    dn.push(DnType::CountryName, DnValue::PrintableString(country));
    dn.push(
        DnType::LocalityName,
        DnValue::Utf8String(settings.locality.clone()),
    );
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String(settings.organization.clone()),
    );
    params.distinguished_name = dn;

    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

    params.serial_number = Some(SerialNumber::from(serial));

    let (not_before, not_after) = validity_from_now(settings.validity)?;
    params.not_before = not_before;
    params.not_after = not_after;

    let (key_pair, key_pem) = generate_rsa_key()?;
    let cert = params.self_signed(&key_pair).map_err(|e| {
        PkiError::CertificateGeneration(format!("failed to create CA cert: {}", e))
    })?;

    let cert_pem = cert.pem();
    Certificate::from_pem(&cert_pem, &key_pem, &cert_pem)
}

/// Sign a fresh leaf for `common_name` with `root`
pub fn issue_leaf(
    root: &Certificate,
    common_name: &str,
    validity: Duration,
    dns_names: &[String],
) -> Result<Certificate> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    params.distinguished_name = dn;

    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsagePurpose::ServerAuth,
    ];

    params.subject_alt_names = dns_names
        .iter()
        .map(|name| {
            Ia5String::try_from(name.clone())
                .map(SanType::DnsName)
                .map_err(|e| {
                    PkiError::CertificateGeneration(format!("invalid DNS name '{}': {}", name, e))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    params.serial_number = Some(SerialNumber::from(random_serial_bytes()));

    let (not_before, not_after) = validity_from_now(validity)?;
    params.not_before = not_before;
    params.not_after = not_after;

    let (leaf_key, leaf_key_pem) = generate_rsa_key()?;

    let ca_key = root.key_pair()?;
    let issuer = Issuer::from_ca_cert_pem(&root.cert_pem, &ca_key)
        .map_err(|e| PkiError::Parse(format!("failed to create issuer: {}", e)))?;

    let cert = params.signed_by(&leaf_key, &issuer).map_err(|e| {
        PkiError::CertificateGeneration(format!("failed to sign certificate: {}", e))
    })?;

    Certificate::from_pem(&cert.pem(), &leaf_key_pem, &root.cert_pem)
}

/// Run key generation and signing off the async worker threads
pub(crate) async fn issue_leaf_blocking(
    root: Arc<Certificate>,
    common_name: &str,
    validity: Duration,
    dns_names: &[String],
) -> Result<Certificate> {
    let common_name = common_name.to_string();
    let dns_names = dns_names.to_vec();
    tokio::task::spawn_blocking(move || issue_leaf(&root, &common_name, validity, &dns_names))
        .await
        .map_err(|e| PkiError::CertificateGeneration(format!("signing task failed: {}", e)))?
}

/// Issuer that owns and persists its own root CA
pub struct ArchonIssuer<S> {
    store: Arc<S>,
    namespace: String,
    settings: RootCaSettings,
    root: RwLock<Arc<Certificate>>,
}

impl<S: ClusterStore> ArchonIssuer<S> {
    /// Load the persisted root CA, or generate and persist one.
    ///
    /// When another replica wins the race to create the secret, its root is
    /// used instead of the one generated here.
    pub async fn bootstrap(store: Arc<S>, namespace: &str, settings: RootCaSettings) -> Result<Self> {
        let root = match persist::load_root(store.as_ref(), namespace, SecretKeys::CA).await? {
            Some(root) => {
                info!(serial = %root.serial_number, "Loaded root CA from {}/{}", namespace, persist::secret_name());
                root
            }
            None => {
                let generated = new_root_ca(&settings)?;
                let root = persist::save_root(store.as_ref(), namespace, SecretKeys::CA, &generated).await?;
                info!(serial = %root.serial_number, "Initialized root CA in {}/{}", namespace, persist::secret_name());
                root
            }
        };

        Ok(Self {
            store,
            namespace: namespace.to_string(),
            settings,
            root: RwLock::new(Arc::new(root)),
        })
    }

    fn current_root(&self) -> Arc<Certificate> {
        self.root
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl<S: ClusterStore> CertificateIssuer for ArchonIssuer<S> {
    fn name(&self) -> &'static str {
        "archon"
    }

    async fn issue_certificate(
        &self,
        common_name: &str,
        validity: Duration,
        dns_names: &[String],
    ) -> Result<Certificate> {
        issue_leaf_blocking(self.current_root(), common_name, validity, dns_names).await
    }

    async fn root_certificate(&self) -> Result<Certificate> {
        Ok(self.current_root().as_ref().clone())
    }

    async fn rotate_root(&self) -> Result<Certificate> {
        let settings = self.settings.clone();
        let root = tokio::task::spawn_blocking(move || new_root_ca(&settings))
            .await
            .map_err(|e| PkiError::CertificateGeneration(format!("root generation task failed: {}", e)))??;
        persist::overwrite_root(self.store.as_ref(), &self.namespace, SecretKeys::CA, &root).await?;

        *self.root.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(root.clone());
        info!(serial = %root.serial_number, "Rotated root CA");
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::serial_to_hex;
    use canal_api::names::{CA_CERT_KEY, CA_KEY_KEY};
    use canal_core::MemoryStore;
    use k8s_openapi::api::core::v1::Secret;
    use x509_parser::prelude::*;

    fn settings() -> RootCaSettings {
        RootCaSettings {
            common_name: "flomesh.io".to_string(),
            validity: Duration::from_secs(3650 * 24 * 3600),
            country: "CN".to_string(),
            locality: "Haidian".to_string(),
            organization: "flomesh.io".to_string(),
        }
    }

    fn parse(pem: &str) -> Vec<u8> {
        crate::certificate::first_certificate_der(pem).unwrap()
    }

    #[test]
    fn test_root_ca_round_trip() {
        let settings = settings();
        let serial = vec![0x5a; SERIAL_NUMBER_BYTES];
        let root = root_ca_with_serial(&settings, serial.clone()).unwrap();
        let reparsed = Certificate::from_pem(&root.cert_pem, &root.key_pem, &root.ca_bundle).unwrap();

        assert_eq!(reparsed.common_name, settings.common_name);
        assert_eq!(root.serial_number, serial_to_hex(&serial));
        assert_eq!(reparsed.serial_number, root.serial_number);
        assert_eq!(reparsed.expiration, root.expiration);
        assert_eq!(root.ca_bundle, root.cert_pem);

        let der = parse(&root.cert_pem);
        let (_, cert) = X509Certificate::from_der(&der).unwrap();
        assert!(cert.is_ca());
        let usage = cert.key_usage().unwrap().unwrap().value;
        assert!(usage.key_cert_sign());
        assert!(usage.crl_sign());
        assert_eq!(cert.raw_serial(), serial.as_slice());

        let not_before = cert.validity().not_before.timestamp();
        let not_after = cert.validity().not_after.timestamp();
        assert_eq!(not_after - not_before, settings.validity.as_secs() as i64);
        assert_eq!(root.expiration.timestamp(), not_after);
    }

    #[test]
    fn test_random_serials_are_positive() {
        for _ in 0..32 {
            let bytes = random_serial_bytes();
            assert_eq!(bytes.len(), SERIAL_NUMBER_BYTES);
            assert!(bytes[0] != 0 && bytes[0] < 0x80);
        }
    }

    #[test]
    fn test_root_serials_differ() {
        let first = new_root_ca(&settings()).unwrap();
        let second = new_root_ca(&settings()).unwrap();
        assert_ne!(first.serial_number, second.serial_number);
    }

    #[test]
    fn test_leaf_is_signed_by_root() {
        let root = new_root_ca(&settings()).unwrap();
        let dns = vec!["svc.ns.svc".to_string()];
        let leaf = issue_leaf(&root, "svc.ns.svc", Duration::from_secs(3600), &dns).unwrap();

        assert_eq!(leaf.common_name, "svc.ns.svc");
        assert_eq!(leaf.ca_bundle, root.cert_pem);

        let root_der = parse(&root.cert_pem);
        let (_, root_cert) = X509Certificate::from_der(&root_der).unwrap();
        let leaf_der = parse(&leaf.cert_pem);
        let (_, leaf_cert) = X509Certificate::from_der(&leaf_der).unwrap();

        assert!(!leaf_cert.is_ca());
        assert_eq!(leaf_cert.issuer().to_string(), root_cert.subject().to_string());
        assert!(leaf_cert.verify_signature(Some(root_cert.public_key())).is_ok());

        let eku = leaf_cert.extended_key_usage().unwrap().unwrap().value;
        assert!(eku.client_auth);
        assert!(eku.server_auth);
        let usage = leaf_cert.key_usage().unwrap().unwrap().value;
        assert!(usage.digital_signature());
        assert!(usage.key_encipherment());
    }

    #[test]
    fn test_leaf_rejects_invalid_dns_name() {
        let root = new_root_ca(&settings()).unwrap();
        let result = issue_leaf(&root, "cn", Duration::from_secs(60), &["bücher.example".to_string()]);
        assert!(matches!(result, Err(PkiError::CertificateGeneration(_))));
    }

    #[tokio::test]
    async fn test_bootstrap_persists_root() {
        let store = Arc::new(MemoryStore::new());
        let issuer = ArchonIssuer::bootstrap(store.clone(), "flomesh", settings()).await.unwrap();
        let root = issuer.root_certificate().await.unwrap();

        let secret: Secret = store.get("flomesh", persist::secret_name()).await.unwrap().unwrap();
        let data = secret.data.unwrap();
        assert_eq!(data[CA_CERT_KEY].0, root.cert_pem.as_bytes());
        assert_eq!(data[CA_KEY_KEY].0, root.key_pem.as_bytes());

        // a second process reuses the stored root
        let again = ArchonIssuer::bootstrap(store.clone(), "flomesh", settings()).await.unwrap();
        assert_eq!(again.root_certificate().await.unwrap(), root);
    }

    #[tokio::test]
    async fn test_rotate_root_replaces_secret() {
        let store = Arc::new(MemoryStore::new());
        let issuer = ArchonIssuer::bootstrap(store.clone(), "flomesh", settings()).await.unwrap();
        let old = issuer.root_certificate().await.unwrap();

        let new = issuer.rotate_root().await.unwrap();
        assert_ne!(old.serial_number, new.serial_number);
        assert_eq!(issuer.root_certificate().await.unwrap(), new);

        let reloaded = ArchonIssuer::bootstrap(store, "flomesh", settings()).await.unwrap();
        assert_eq!(reloaded.root_certificate().await.unwrap(), new);
    }
}
