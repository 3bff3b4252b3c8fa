//! Issued certificate records and the key material helpers behind them

use chrono::{DateTime, Utc};
use rcgen::KeyPair;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use std::fmt;
use std::time::Duration;
use x509_parser::prelude::*;

use crate::{PkiError, Result};

/// Modulus size of every generated key
pub const RSA_KEY_BITS: usize = 2048;

/// A PEM certificate with its private key and the CA bundle that trusts it
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    pub common_name: String,
    /// Hex serial number without leading zero bytes
    pub serial_number: String,
    /// PEM of the CA that issued this certificate; a root carries itself
    pub ca_bundle: String,
    pub cert_pem: String,
    pub key_pem: String,
    pub expiration: DateTime<Utc>,
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("common_name", &self.common_name)
            .field("serial_number", &self.serial_number)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

impl Certificate {
    /// Build a record from PEM, reading name, serial and expiry from the certificate
    pub fn from_pem(cert_pem: &str, key_pem: &str, ca_bundle: &str) -> Result<Self> {
        let der = first_certificate_der(cert_pem)?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| PkiError::Parse(format!("failed to parse certificate: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        let not_after = cert.validity().not_after.timestamp();
        let expiration = DateTime::<Utc>::from_timestamp(not_after, 0)
            .ok_or_else(|| PkiError::Parse(format!("notAfter {} is out of range", not_after)))?;

        Ok(Self {
            common_name,
            serial_number: serial_to_hex(cert.raw_serial()),
            ca_bundle: ca_bundle.to_string(),
            cert_pem: cert_pem.to_string(),
            key_pem: key_pem.to_string(),
            expiration,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }

    /// Whether the certificate expires within `window` of `now`
    pub fn expires_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(window) {
            Ok(window) => self.expiration <= now + window,
            Err(_) => true,
        }
    }

    pub(crate) fn key_pair(&self) -> Result<KeyPair> {
        KeyPair::from_pem(&self.key_pem)
            .map_err(|e| PkiError::Parse(format!("failed to load private key: {}", e)))
    }
}

/// Hex rendering of a DER serial with leading zero bytes removed
pub fn serial_to_hex(raw: &[u8]) -> String {
    let start = raw.iter().position(|b| *b != 0).unwrap_or(raw.len());
    hex::encode(&raw[start..])
}

/// DER bytes of the first certificate in a PEM bundle
pub fn first_certificate_der(pem: &str) -> Result<Vec<u8>> {
    let mut reader = pem.as_bytes();
    let first = rustls_pemfile::certs(&mut reader).next();
    first
        .ok_or_else(|| PkiError::Parse("no certificate found in PEM".to_string()))?
        .map(|der| der.to_vec())
        .map_err(|e| PkiError::Parse(format!("failed to read PEM: {}", e)))
}

/// Generate a fresh RSA key, returning it both as a signing key and as PKCS#8 PEM
pub fn generate_rsa_key() -> Result<(KeyPair, String)> {
    let mut rng = rand::thread_rng();
    let key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
        .map_err(|e| PkiError::KeyGeneration(format!("failed to generate RSA key: {}", e)))?;
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| PkiError::KeyGeneration(format!("failed to encode RSA key: {}", e)))?;
    let key_pair = KeyPair::from_pem(&pem)
        .map_err(|e| PkiError::KeyGeneration(format!("failed to load RSA key: {}", e)))?;
    Ok((key_pair, pem.to_string()))
}

/// Validity window starting now, truncated to whole seconds
pub(crate) fn validity_from_now(
    validity: Duration,
) -> Result<(::time::OffsetDateTime, ::time::OffsetDateTime)> {
    let now = ::time::OffsetDateTime::now_utc();
    let not_before = ::time::OffsetDateTime::from_unix_timestamp(now.unix_timestamp())
        .map_err(|e| PkiError::CertificateGeneration(format!("invalid notBefore: {}", e)))?;
    let seconds = i64::try_from(validity.as_secs()).map_err(|_| {
        PkiError::CertificateGeneration(format!("validity {:?} is too long", validity))
    })?;
    let not_after = not_before
        .checked_add(::time::Duration::seconds(seconds))
        .ok_or_else(|| {
            PkiError::CertificateGeneration(format!("validity {:?} is too long", validity))
        })?;
    Ok((not_before, not_after))
}
