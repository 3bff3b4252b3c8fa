use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("The path {path:?} has been defined in Ingress {ingress}")]
    PathConflict { path: String, ingress: String },

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Kubernetes error: {0}")]
    Kubernetes(kube::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the runtime should retry the operation that produced this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Conflict(_) | CoreError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, CoreError::AlreadyExists(_))
    }
}

impl From<kube::Error> for CoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => match resp.code {
                404 => CoreError::NotFound(resp.message),
                409 if resp.reason == "AlreadyExists" => CoreError::AlreadyExists(resp.message),
                409 => CoreError::Conflict(resp.message),
                429 | 500..=599 => CoreError::Transient(resp.message),
                _ => CoreError::Kubernetes(kube::Error::Api(resp)),
            },
            kube::Error::HyperError(e) => CoreError::Transient(e.to_string()),
            kube::Error::Service(e) => CoreError::Transient(e.to_string()),
            other => CoreError::Kubernetes(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} happened", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_api_errors_are_classified() {
        assert!(CoreError::from(api_error(404, "NotFound")).is_not_found());
        assert!(CoreError::from(api_error(409, "AlreadyExists")).is_already_exists());
        assert!(matches!(
            CoreError::from(api_error(409, "Conflict")),
            CoreError::Conflict(_)
        ));
        assert!(matches!(
            CoreError::from(api_error(503, "ServiceUnavailable")),
            CoreError::Transient(_)
        ));
        assert!(matches!(
            CoreError::from(api_error(422, "Invalid")),
            CoreError::Kubernetes(_)
        ));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(CoreError::Conflict("rv mismatch".into()).is_retryable());
        assert!(CoreError::Transient("timeout".into()).is_retryable());
        assert!(!CoreError::InvalidInput("bad".into()).is_retryable());
        assert!(!CoreError::NotFound("gone".into()).is_retryable());
    }

    #[test]
    fn test_path_conflict_message() {
        let err = CoreError::PathConflict {
            path: "/p".to_string(),
            ingress: "a/svcexp-ing-s".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "The path \"/p\" has been defined in Ingress a/svcexp-ing-s"
        );
    }
}
