use crate::descriptor::ReturnMode;
use rest_client::{ApiVersion, RestError};
use thiserror::Error;

/// Path template parse and expansion failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unbalanced brace at byte {position} in path template '{template}'")]
    UnbalancedBrace { template: String, position: usize },

    #[error("empty placeholder in path template '{template}'")]
    EmptyPlaceholder { template: String },

    #[error("placeholder '{name}' in path template '{template}' is not an identifier")]
    InvalidPlaceholder { template: String, name: String },

    #[error("placeholder '{name}' appears more than once in path template '{template}'")]
    DuplicatePlaceholder { template: String, name: String },

    #[error("no value supplied for path variable '{name}'")]
    MissingVariable { name: String },
}

/// A client description that cannot be served
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("client '{client}' declares operation '{operation}' more than once")]
    DuplicateOperation {
        client: &'static str,
        operation: &'static str,
    },

    #[error("operation '{operation}' has an invalid path")]
    Template {
        operation: &'static str,
        #[source]
        source: TemplateError,
    },

    #[error("operation '{operation}' has an invalid version label")]
    Version {
        operation: &'static str,
        #[source]
        source: RestError,
    },
}

/// Errors produced while resolving or executing a described operation
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("client '{client}' has no operation '{operation}'")]
    UnknownOperation { client: String, operation: String },

    /// Blocking entry point used for a deferred operation, or the reverse
    #[error("operation '{operation}' is declared {declared} but was invoked {requested}")]
    ReturnModeMismatch {
        operation: String,
        declared: ReturnMode,
        requested: ReturnMode,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("invalid API version: {0}")]
    Version(#[source] RestError),

    #[error(transparent)]
    Http(#[from] RestError),

    /// The server answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Status {
        status: http::StatusCode,
        body: String,
        /// Version the request asked for, if any
        version: Option<ApiVersion>,
    },

    /// The client runtime shut down before the call completed
    #[error("client runtime shut down")]
    RuntimeShutdown,
}

impl InvokeError {
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
