//! Root CA storage in the CA bundle secret

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use tracing::debug;

use canal_api::names::{CA_BUNDLE_SECRET_NAME, CA_CERT_KEY, CA_KEY_KEY, TLS_CERT_KEY, TLS_KEY_KEY};
use canal_core::{ClusterStore, CoreError};

use crate::certificate::Certificate;
use crate::{PkiError, Result};

/// Data keys a root CA is stored under
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecretKeys {
    pub cert: &'static str,
    pub key: &'static str,
}

impl SecretKeys {
    /// Layout written by the in-process issuers
    pub const CA: SecretKeys = SecretKeys {
        cert: CA_CERT_KEY,
        key: CA_KEY_KEY,
    };

    /// Layout written by cert-manager
    pub const TLS: SecretKeys = SecretKeys {
        cert: TLS_CERT_KEY,
        key: TLS_KEY_KEY,
    };
}

pub fn secret_name() -> &'static str {
    CA_BUNDLE_SECRET_NAME
}

/// Read a root CA out of a secret
pub fn root_from_secret(secret: &Secret, keys: SecretKeys) -> Result<Certificate> {
    let field = |key: &str| -> Result<String> {
        let bytes = secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .ok_or_else(|| {
                PkiError::InvalidSecret(format!("secret {} has no {:?} key", CA_BUNDLE_SECRET_NAME, key))
            })?;
        String::from_utf8(bytes.0.clone()).map_err(|_| {
            PkiError::InvalidSecret(format!("{:?} in secret {} is not UTF-8", key, CA_BUNDLE_SECRET_NAME))
        })
    };

    let cert_pem = field(keys.cert)?;
    let key_pem = field(keys.key)?;
    Certificate::from_pem(&cert_pem, &key_pem, &cert_pem)
}

fn data_for(root: &Certificate, keys: SecretKeys) -> BTreeMap<String, ByteString> {
    BTreeMap::from([
        (keys.cert.to_string(), ByteString(root.cert_pem.clone().into_bytes())),
        (keys.key.to_string(), ByteString(root.key_pem.clone().into_bytes())),
    ])
}

fn secret_for(namespace: &str, root: &Certificate, keys: SecretKeys) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(CA_BUNDLE_SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(data_for(root, keys)),
        ..Default::default()
    }
}

/// Load the stored root CA; `None` when the secret does not exist
pub async fn load_root<S: ClusterStore>(
    store: &S,
    namespace: &str,
    keys: SecretKeys,
) -> Result<Option<Certificate>> {
    match store.get::<Secret>(namespace, CA_BUNDLE_SECRET_NAME).await? {
        Some(secret) => root_from_secret(&secret, keys).map(Some),
        None => Ok(None),
    }
}

/// Persist a freshly generated root CA, returning the root that is now authoritative.
///
/// If the secret already exists the stored root wins over `root`.
pub async fn save_root<S: ClusterStore>(
    store: &S,
    namespace: &str,
    keys: SecretKeys,
    root: &Certificate,
) -> Result<Certificate> {
    match store.create(&secret_for(namespace, root, keys)).await {
        Ok(_) => Ok(root.clone()),
        Err(e) if e.is_already_exists() => {
            debug!("Secret {}/{} already exists, using stored root", namespace, CA_BUNDLE_SECRET_NAME);
            load_root(store, namespace, keys).await?.ok_or_else(|| {
                PkiError::Store(CoreError::NotFound(format!(
                    "secret {}/{} disappeared",
                    namespace, CA_BUNDLE_SECRET_NAME
                )))
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Replace whatever root CA is stored with `root`
pub async fn overwrite_root<S: ClusterStore>(
    store: &S,
    namespace: &str,
    keys: SecretKeys,
    root: &Certificate,
) -> Result<()> {
    match store.get::<Secret>(namespace, CA_BUNDLE_SECRET_NAME).await? {
        Some(mut existing) => {
            existing.data = Some(data_for(root, keys));
            store.update(&existing).await?;
        }
        None => {
            store.create(&secret_for(namespace, root, keys)).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archon::{new_root_ca, RootCaSettings};
    use canal_core::MemoryStore;
    use std::time::Duration;

    fn root() -> Certificate {
        new_root_ca(&RootCaSettings {
            common_name: "flomesh.io".to_string(),
            validity: Duration::from_secs(24 * 3600),
            country: "CN".to_string(),
            locality: "Haidian".to_string(),
            organization: "flomesh.io".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_secret_is_none() {
        let store = MemoryStore::new();
        assert!(load_root(&store, "flomesh", SecretKeys::CA).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_keys_is_invalid_secret() {
        let store = MemoryStore::new();
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(CA_BUNDLE_SECRET_NAME.to_string()),
                namespace: Some("flomesh".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                CA_CERT_KEY.to_string(),
                ByteString(b"pem".to_vec()),
            )])),
            ..Default::default()
        };
        store.create(&secret).await.unwrap();

        let result = load_root(&store, "flomesh", SecretKeys::CA).await;
        assert!(matches!(result, Err(PkiError::InvalidSecret(_))));

        // the same secret read with the cert-manager layout lacks both keys
        let result = load_root(&store, "flomesh", SecretKeys::TLS).await;
        assert!(matches!(result, Err(PkiError::InvalidSecret(_))));
    }

    #[tokio::test]
    async fn test_save_root_already_exists_uses_stored_root() {
        let store = MemoryStore::new();
        let first = root();
        let second = root();

        let saved = save_root(&store, "flomesh", SecretKeys::CA, &first).await.unwrap();
        assert_eq!(saved, first);

        let saved = save_root(&store, "flomesh", SecretKeys::CA, &second).await.unwrap();
        assert_eq!(saved.serial_number, first.serial_number);
        assert_eq!(store.count::<Secret>(), 1);
    }

    #[tokio::test]
    async fn test_overwrite_root() {
        let store = MemoryStore::new();
        let first = root();
        let second = root();
        save_root(&store, "flomesh", SecretKeys::CA, &first).await.unwrap();

        overwrite_root(&store, "flomesh", SecretKeys::CA, &second).await.unwrap();
        let loaded = load_root(&store, "flomesh", SecretKeys::CA).await.unwrap().unwrap();
        assert_eq!(loaded.serial_number, second.serial_number);
    }
}
