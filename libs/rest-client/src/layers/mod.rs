//! Tower layers composed by [`RestClientBuilder`](crate::RestClientBuilder).
//!
//! - [`ApiVersionLayer`] writes the request's [`ApiVersion`](crate::ApiVersion) onto the wire
//! - [`DefaultHeadersLayer`] fills in `User-Agent` and other client-wide headers
//! - [`RetryLayer`] retries failed attempts with exponential backoff

mod api_version;
mod default_headers;
mod retry;

pub use api_version::{ApiVersionLayer, ApiVersionService};
pub use default_headers::{DefaultHeadersLayer, DefaultHeadersService};
pub use retry::{RETRY_ATTEMPT_HEADER, RetryLayer, RetryService};
