//! Bindings to the CRDs owned by [cert-manager](https://cert-manager.io/).
//!
//! These are consumed, never installed, so no schema is generated for them.

use k8s_openapi::ByteString;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Condition type cert-manager sets once a resource is usable
pub const CONDITION_READY: &str = "Ready";

/// See <https://cert-manager.io/docs/reference/api-docs/#cert-manager.io/v1.Issuer>.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Issuer",
    namespaced,
    schema = "disabled",
    status = "CertManagerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_signed: Option<SelfSignedIssuer>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca: Option<CaIssuer>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SelfSignedIssuer {}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaIssuer {
    pub secret_name: String,
}

/// See <https://cert-manager.io/docs/reference/api-docs/#cert-manager.io/v1.Certificate>.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Certificate",
    namespaced,
    schema = "disabled",
    status = "CertManagerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    pub secret_name: String,

    pub common_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(rename = "isCA", default)]
    pub is_ca: bool,

    #[serde(default)]
    pub dns_names: Vec<String>,

    pub issuer_ref: ObjectReference,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<CertificatePrivateKey>,

    #[serde(default)]
    pub usages: Vec<String>,
}

/// See <https://cert-manager.io/docs/reference/api-docs/#cert-manager.io/v1.CertificatePrivateKey>.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificatePrivateKey {
    pub algorithm: String,
    pub size: u32,
}

/// See <https://cert-manager.io/docs/reference/api-docs/#cert-manager.io/v1.CertificateRequest>.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "CertificateRequest",
    namespaced,
    schema = "disabled",
    status = "CertificateRequestStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequestSpec {
    /// PEM-encoded CSR
    pub request: ByteString,

    #[serde(rename = "isCA", default)]
    pub is_ca: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(default)]
    pub usages: Vec<String>,

    pub issuer_ref: ObjectReference,
}

/// See <https://cert-manager.io/docs/reference/api-docs/#meta.cert-manager.io/v1.ObjectReference>.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Status shared by Issuer and Certificate
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CertManagerStatus {
    #[serde(default)]
    pub conditions: Vec<CertManagerCondition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequestStatus {
    #[serde(default)]
    pub conditions: Vec<CertManagerCondition>,

    /// PEM-encoded signed certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<ByteString>,

    /// PEM-encoded CA that signed `certificate`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca: Option<ByteString>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CertManagerCondition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Whether a condition list carries `Ready=True`
pub fn is_ready(conditions: &[CertManagerCondition]) -> bool {
    conditions
        .iter()
        .any(|c| c.type_ == CONDITION_READY && c.status == "True")
}

impl Issuer {
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().map_or(false, |s| is_ready(&s.conditions))
    }
}

impl Certificate {
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().map_or(false, |s| is_ready(&s.conditions))
    }
}

impl CertificateRequest {
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().map_or(false, |s| is_ready(&s.conditions))
    }
}
