//! Error types for the SaaS provisioner

use thiserror::Error;

/// Result type alias for provisioner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while admitting, provisioning or listing tenants
#[derive(Debug, Error)]
pub enum Error {
    /// Tenant name does not satisfy the namespace naming rules
    #[error("invalid namespace name: {0:?}")]
    InvalidName(String),

    /// Request body could not be decoded
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Tenant name is already claimed
    #[error("namespace already exists: {0}")]
    Conflict(String),

    /// Tenant does not exist
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Admin registration against the tenant backend failed
    #[error("bootstrap error: {0}")]
    Bootstrap(String),

    /// A workload template is missing an expected slot
    #[error("template error: {0}")]
    Template(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unexpected failure inside the service
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Self::Bootstrap(msg.into())
    }

    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error is the caller's fault rather than the cluster's
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidName(_) | Error::InvalidRequest(_) | Error::Conflict(_) | Error::NotFound(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Bootstrap(err.to_string())
    }
}
