use canal_core::CoreError;
use thiserror::Error;

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// A poll for an externally issued certificate ran past its deadline
    #[error("timed out waiting for {0}")]
    TimeoutIssuing(String),

    /// The CA secret exists but lacks the expected data keys
    #[error("invalid CA secret: {0}")]
    InvalidSecret(String),

    #[error("certificate not found: {0}")]
    CertificateNotFound(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("certificate generation failed: {0}")]
    CertificateGeneration(String),

    #[error("certificate parsing error: {0}")]
    Parse(String),

    /// The active issuer cannot replace its root CA
    #[error("root rotation is not supported by the {0} issuer")]
    RotationUnsupported(&'static str),

    #[error(transparent)]
    Store(#[from] CoreError),
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;
