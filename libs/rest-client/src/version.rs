//! API version labels and the rules for carrying them on the wire.
//!
//! A request opts into versioning by carrying an [`ApiVersion`] in its
//! extensions (see [`RequestBuilder::version`](crate::RequestBuilder::version)).
//! The [`ApiVersionLayer`](crate::ApiVersionLayer) then writes the label into
//! every header and query parameter named by the client's [`VersioningConfig`].

use crate::error::RestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default header used to signal the requested API version
pub const DEFAULT_VERSION_HEADER: &str = "X-API-VERSION";

/// Conventional query parameter name for version signalling
pub const DEFAULT_VERSION_PARAMETER: &str = "api-version";

/// A non-empty API version label such as `"1"` or `"2"`.
///
/// Labels are trimmed and must be representable as an HTTP header value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiVersion(String);

impl ApiVersion {
    /// Validate and wrap a version label.
    ///
    /// # Errors
    /// Returns `RestError::InvalidVersion` if the label is blank or contains
    /// characters that cannot appear in a header value.
    pub fn new(label: impl Into<String>) -> Result<Self, RestError> {
        let raw = label.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RestError::InvalidVersion {
                label: raw,
                reason: "version label is empty".to_owned(),
            });
        }
        if http::HeaderValue::from_str(trimmed).is_err() {
            return Err(RestError::InvalidVersion {
                label: raw,
                reason: "version label is not a valid header value".to_owned(),
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ApiVersion {
    type Err = RestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = RestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ApiVersion> for String {
    fn from(version: ApiVersion) -> Self {
        version.0
    }
}

/// Where a client writes the version label of a versioned request.
///
/// Every listed header is set and every listed query parameter is appended.
/// Both lists empty disables version signalling for the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VersioningConfig {
    /// Header names that receive the version label (default: `X-API-VERSION`)
    pub headers: Vec<String>,

    /// Query parameter names that receive the version label (default: none)
    pub parameters: Vec<String>,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            headers: vec![DEFAULT_VERSION_HEADER.to_owned()],
            parameters: Vec::new(),
        }
    }
}

impl VersioningConfig {
    /// Signal the version in a single header
    #[must_use]
    pub fn header(name: impl Into<String>) -> Self {
        Self {
            headers: vec![name.into()],
            parameters: Vec::new(),
        }
    }

    /// Signal the version in a single query parameter
    #[must_use]
    pub fn parameter(name: impl Into<String>) -> Self {
        Self {
            headers: Vec::new(),
            parameters: vec![name.into()],
        }
    }

    /// Do not signal versions at all
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            headers: Vec::new(),
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.headers.is_empty() && self.parameters.is_empty()
    }

    /// Parse the configured header names.
    ///
    /// # Errors
    /// Returns `RestError::InvalidHeaderName` for the first name that is not a valid header.
    pub fn header_names(&self) -> Result<Vec<http::HeaderName>, RestError> {
        self.headers
            .iter()
            .map(|name| http::HeaderName::try_from(name.as_str()).map_err(RestError::from))
            .collect()
    }
}
