use client_contract::{DescriptorError, InvokeError};
use http::StatusCode;
use rest_client::RestError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by [`HelloClient`](crate::HelloClient) operations
#[derive(Debug, Error)]
pub enum HelloError {
    /// The request never produced a response (connect, TLS, timeout, body limit)
    #[error("hello service request failed: {0}")]
    Transport(#[source] RestError),

    #[error("hello service answered {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The service has no handler for the requested API version
    #[error("hello service does not serve API version {version}")]
    VersionNotFound { version: String },

    #[error("hello client failure: {0}")]
    Internal(#[source] InvokeError),
}

impl HelloError {
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::VersionNotFound { .. } => Some(StatusCode::NOT_FOUND),
            _ => None,
        }
    }
}

impl From<InvokeError> for HelloError {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::Status {
                status: StatusCode::NOT_FOUND,
                version: Some(version),
                ..
            } => Self::VersionNotFound {
                version: version.to_string(),
            },
            InvokeError::Status { status, body, .. } => Self::Status { status, body },
            InvokeError::Http(e) => Self::Transport(e),
            other => Self::Internal(other),
        }
    }
}

/// Failures while loading configuration or building a client from it
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file does not exist: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("invalid configuration: {0}")]
    Extract(#[source] Box<figment::Error>),

    #[error("invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("failed to start client runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] InvokeError),
}
