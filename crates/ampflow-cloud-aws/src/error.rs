//! Amazon Managed Service for Prometheus error types

use ampflow_cloud::CloudError;
use thiserror::Error;

/// Errors surfaced by a [`PrometheusApi`](crate::PrometheusApi) client
#[derive(Error, Debug)]
pub enum AmpError {
    #[error("Workspace not found: {0}")]
    ResourceNotFound(String),

    #[error("Request throttled: {0}")]
    Throttling(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflicting operation in progress: {0}")]
    Conflict(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Service quota exceeded: {0}")]
    ServiceQuotaExceeded(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),
}

impl From<AmpError> for CloudError {
    fn from(err: AmpError) -> Self {
        match err {
            AmpError::ResourceNotFound(id) => CloudError::ResourceNotFound(id),
            AmpError::Throttling(msg) => CloudError::Throttled(msg),
            AmpError::ServiceUnavailable(msg) | AmpError::Conflict(msg) => {
                CloudError::Transient(msg)
            }
            AmpError::Validation(msg) => CloudError::Validation(msg),
            AmpError::AccessDenied(msg) => CloudError::AuthenticationFailed(msg),
            AmpError::MissingEnvVar(name) => {
                CloudError::InvalidConfig(format!("missing environment variable {}", name))
            }
            AmpError::InvalidConfig(msg) => CloudError::InvalidConfig(msg),
            AmpError::Json(e) => CloudError::Json(e),
            AmpError::Cloud(e) => e,
            other @ (AmpError::ServiceQuotaExceeded(_) | AmpError::Api(_)) => {
                CloudError::ApiError(other.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AmpError>;
