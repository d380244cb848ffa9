//! Cloud provider error types

use std::time::Duration;
use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Provisioning of {resource_id} failed: {reason}")]
    Provisioning { resource_id: String, reason: String },

    #[error("Timed out after {elapsed:?} waiting for {resource_id} to become {target}")]
    Timeout {
        resource_id: String,
        target: String,
        elapsed: Duration,
    },

    #[error("Invariant violated during {operation} of {resource_id}: {detail}")]
    InvariantViolation {
        operation: Operation,
        resource_id: String,
        detail: String,
    },

    #[error("Cannot update {resource_id} in place, attributes require replacement: {}", attributes.join(", "))]
    ForceNewUpdate {
        resource_id: String,
        attributes: Vec<String>,
    },

    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        from: crate::lifecycle::LifecyclePhase,
        to: crate::lifecycle::LifecyclePhase,
    },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("{operation} {resource_id}: {source}")]
    Operation {
        operation: Operation,
        resource_id: String,
        #[source]
        source: Box<CloudError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Lifecycle operation an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Import,
    Wait,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Import => write!(f, "import"),
            Operation::Wait => write!(f, "wait"),
        }
    }
}

/// Coarse classification used by retry and idempotence decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Transient,
    Provisioning,
    Timeout,
    InvariantViolation,
    Validation,
    Other,
}

impl CloudError {
    /// Classify this error, looking through [`CloudError::Operation`] context
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::ResourceNotFound(_) => ErrorKind::NotFound,
            CloudError::Throttled(_) | CloudError::Transient(_) => ErrorKind::Transient,
            CloudError::Provisioning { .. } => ErrorKind::Provisioning,
            CloudError::Timeout { .. } => ErrorKind::Timeout,
            CloudError::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            CloudError::Validation(_)
            | CloudError::ForceNewUpdate { .. }
            | CloudError::InvalidConfig(_) => ErrorKind::Validation,
            CloudError::Operation { source, .. } => source.kind(),
            _ => ErrorKind::Other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether the failed call may succeed if issued again
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Attach the operation and resource identifier to an error
    pub fn context(self, operation: Operation, resource_id: impl Into<String>) -> Self {
        match self {
            // Already carries context
            CloudError::Operation { .. } => self,
            other => CloudError::Operation {
                operation,
                resource_id: resource_id.into(),
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
