use crate::builder::RestClientBuilder;
use crate::config::TransportSecurity;
use crate::error::RestError;
use crate::request::RequestBuilder;
use crate::response::ResponseBody;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use tower::Service;
use tower::buffer::Buffer;

pub type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, RestError>> + Send>>;

pub type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// HTTP client over a buffered tower stack.
///
/// Cloning is cheap and clones share the connection pool and concurrency
/// limit. No external locking is needed.
#[derive(Clone)]
pub struct RestClient {
    pub(crate) service: BufferedService,
    pub(crate) max_body_size: usize,
    pub(crate) transport_security: TransportSecurity,
}

impl RestClient {
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, RestError> {
        RestClientBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> RestClientBuilder {
        RestClientBuilder::new()
    }

    /// Start a request. `url` must be absolute; it is validated by `send()`.
    pub fn request(&self, method: http::Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(
            self.service.clone(),
            self.max_body_size,
            self.transport_security,
            method,
            url.to_owned(),
        )
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::POST, url)
    }
}

/// Unwrap the inner `RestError`; anything else means the buffer worker is gone
pub fn map_buffer_error(err: tower::BoxError) -> RestError {
    match err.downcast::<RestError>() {
        Ok(rest_err) => *rest_err,
        Err(err) => {
            tracing::error!(error = %err, "buffer worker closed unexpectedly; service unavailable");
            RestError::ServiceClosed
        }
    }
}

/// Poll the buffer once; a full buffer fails with `Overloaded` instead of waiting.
///
/// # Errors
/// Returns `RestError::Overloaded` when full, or the mapped buffer error.
pub async fn try_acquire_buffer_slot(service: &mut BufferedService) -> Result<(), RestError> {
    use std::task::Poll;

    let polled = std::future::poll_fn(|cx| match service.poll_ready(cx) {
        Poll::Ready(result) => Poll::Ready(Some(result)),
        Poll::Pending => Poll::Ready(None),
    })
    .await;

    match polled {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(map_buffer_error(e)),
        None => Err(RestError::Overloaded),
    }
}
