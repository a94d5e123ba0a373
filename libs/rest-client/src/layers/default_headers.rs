use crate::error::RestError;
use http::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use http::{Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Fills in `User-Agent` and other client-wide headers the caller left unset
#[derive(Clone)]
pub struct DefaultHeadersLayer {
    headers: Arc<HeaderMap>,
}

impl DefaultHeadersLayer {
    /// `extra` entries win over `user_agent` when they name `User-Agent` too.
    ///
    /// # Errors
    /// Returns `RestError::InvalidHeaderName` or `RestError::InvalidHeaderValue`
    /// for the first entry that is not a valid header.
    pub fn try_new(user_agent: &str, extra: &[(String, String)]) -> Result<Self, RestError> {
        let mut headers = HeaderMap::with_capacity(extra.len() + 1);
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        for (name, value) in extra {
            headers.insert(
                HeaderName::try_from(name.as_str())?,
                HeaderValue::try_from(value.as_str())?,
            );
        }
        Ok(Self {
            headers: Arc::new(headers),
        })
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            headers: Arc::clone(&self.headers),
        }
    }
}

#[derive(Clone)]
pub struct DefaultHeadersService<S> {
    inner: S,
    headers: Arc<HeaderMap>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DefaultHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let target = req.headers_mut();
        for (name, value) in self.headers.iter() {
            if !target.contains_key(name) {
                target.insert(name.clone(), value.clone());
            }
        }
        self.inner.call(req)
    }
}
