//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior.
//! Problems the user has to fix (invalid records, missing secrets) are not
//! errors at this level: they are reported through the status engine.

use std::time::Duration;
use thiserror::Error;

use crate::crd::VersionError;

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Kubernetes API error with the object and operation it happened on
    #[error("failed to {operation} {object}: {source}")]
    KubeContext {
        operation: &'static str,
        object: String,
        #[source]
        source: kube::Error,
    },

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Object referenced by a record does not exist
    #[error("{kind} {name} not found")]
    MissingReference { kind: &'static str, name: String },

    /// Validation error in resource spec
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Version parsing error
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    /// Password hashing error
    #[error("Password hashing error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    /// A blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Attach the operation and namespaced object name to a Kubernetes error.
    pub fn kube(operation: &'static str, object: impl Into<String>, source: kube::Error) -> Self {
        Error::KubeContext {
            operation,
            object: object.into(),
            source,
        }
    }

    /// A referenced Secret, ConfigMap or IronicDatabase is missing.
    pub fn missing(kind: &'static str, name: impl Into<String>) -> Self {
        Error::MissingReference {
            kind,
            name: name.into(),
        }
    }

    fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube(kube::Error::Api(e))
            | Error::KubeContext {
                source: kube::Error::Api(e),
                ..
            } => Some(e.code),
            _ => None,
        }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// Check if this error is an optimistic concurrency conflict
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }

    /// Check if this error can only be fixed by editing the record or the
    /// objects it references
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::MissingField(_) | Error::Version(_)
        )
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) | Error::KubeContext { source: e, .. } => {
                // Retry on network errors, rate limiting, conflicts and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err)
                        if api_err.code >= 500 || api_err.code == 429 || api_err.code == 409
                ) || matches!(e, kube::Error::Service(_) | kube::Error::HyperError(_))
            }
            Error::Validation(_) | Error::MissingField(_) => false,
            Error::MissingReference { .. } => false,
            Error::Serialization(_) | Error::Version(_) | Error::Bcrypt(_) => false,
            Error::Task(_) => true,
        }
    }

    /// Get the recommended requeue duration for this error
    pub fn requeue_after(&self) -> Duration {
        if self.is_conflict() {
            Duration::from_secs(1)
        } else if self.is_retryable() {
            Duration::from_secs(30)
        } else {
            Duration::from_secs(300)
        }
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
