use http::StatusCode;
use std::time::Duration;
use thiserror::Error;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by [`RestClient`](crate::RestClient), grouped by the stage that failed:
/// request assembly, transport, or response reading.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RestError {
    #[error("cannot assemble request: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("cannot encode query string: {0}")]
    QueryEncode(#[from] serde_urlencoded::ser::Error),

    /// Not an absolute URL with scheme and host
    #[error("cannot request '{url}': {reason}")]
    InvalidUri { url: String, reason: String },

    /// Scheme refused by the client's [`TransportSecurity`](crate::TransportSecurity)
    #[error("scheme '{scheme}' refused: {reason}")]
    InvalidScheme { scheme: String, reason: String },

    #[error("API version '{label}' rejected: {reason}")]
    InvalidVersion { label: String, reason: String },

    /// One attempt ran past `request_timeout`
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// `total_timeout` ran out, retries and backoff included
    #[error("gave up after {0:?} including retries")]
    DeadlineExceeded(Duration),

    /// Connect, DNS, reset or protocol failure
    #[error("transport failure: {0}")]
    Transport(#[source] BoxError),

    #[error("TLS setup failed: {0}")]
    Tls(#[source] BoxError),

    /// Rejected by the concurrency limit or a full request queue
    #[error("client overloaded, request rejected")]
    Overloaded,

    /// The background worker driving the client has stopped
    #[error("client worker stopped")]
    ServiceClosed,

    /// Non-2xx status seen by a checked body reader
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: StatusCode,
        body_preview: String,
        retry_after: Option<Duration>,
    },

    #[error("response body exceeds {limit} bytes (read {actual})")]
    BodyTooLarge { limit: usize, actual: usize },

    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

impl RestError {
    pub(crate) fn invalid_uri(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUri {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Status of an `HttpStatus` error
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<hyper_util::client::legacy::Error> for RestError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}
