#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! hyper-based HTTP client with API version signalling.
//!
//! - rustls TLS, HTTPS only unless explicitly relaxed for tests
//! - pooled connections, per-attempt and total timeouts
//! - retries with exponential backoff and `Retry-After` support
//! - concurrency limiting with fail-fast overload errors
//! - transparent gzip/brotli/deflate decompression
//! - per-request [`ApiVersion`] written to configurable headers and query parameters
//!
//! ```ignore
//! use rest_client::{ApiVersion, RestClient, VersioningConfig};
//!
//! let client = RestClient::builder()
//!     .versioning(VersioningConfig::header("X-API-VERSION"))
//!     .build()?;
//!
//! let greeting = client
//!     .get("https://hello.example.com/hello/greeting/Fred")
//!     .version(ApiVersion::new("2")?)
//!     .send()
//!     .await?
//!     .text()
//!     .await?;
//! ```

mod builder;
mod client;
mod config;
mod error;
mod layers;
mod request;
mod response;
mod tls;
mod version;

pub use builder::RestClientBuilder;
pub use client::RestClient;
pub use config::{
    AttemptOutcome, Backoff, DEFAULT_USER_AGENT, PoolConfig, RestClientConfig, RetryConfig,
    RootStore, TransportSecurity, is_idempotent_method,
};
pub use error::RestError;
pub use layers::{
    ApiVersionLayer, ApiVersionService, DefaultHeadersLayer, DefaultHeadersService,
    RETRY_ATTEMPT_HEADER, RetryLayer, RetryService,
};
pub use request::RequestBuilder;
pub use response::{ERROR_BODY_PREVIEW_LIMIT, ResponseBody, RestResponse, parse_retry_after};
pub use version::{ApiVersion, DEFAULT_VERSION_HEADER, DEFAULT_VERSION_PARAMETER, VersioningConfig};
