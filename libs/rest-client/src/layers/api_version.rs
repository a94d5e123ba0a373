use crate::error::RestError;
use crate::version::{ApiVersion, VersioningConfig};
use http::uri::PathAndQuery;
use http::{HeaderName, HeaderValue, Request, Response, Uri};
use futures::future::{self, Either, MapErr, Ready, TryFutureExt};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{BoxError, Layer, Service};

/// Writes the [`ApiVersion`] found in request extensions into the configured
/// headers and query parameters.
///
/// Requests without an `ApiVersion` extension pass through untouched. Headers
/// and parameters the caller already set are never overwritten.
#[derive(Clone)]
pub struct ApiVersionLayer {
    headers: Arc<[HeaderName]>,
    parameters: Arc<[String]>,
}

impl ApiVersionLayer {
    /// # Errors
    /// Returns `RestError::InvalidHeaderName` if a configured header name is invalid
    pub fn try_new(config: &VersioningConfig) -> Result<Self, RestError> {
        Ok(Self {
            headers: config.header_names()?.into(),
            parameters: config.parameters.clone().into(),
        })
    }
}

impl<S> Layer<S> for ApiVersionLayer {
    type Service = ApiVersionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiVersionService {
            inner,
            headers: Arc::clone(&self.headers),
            parameters: Arc::clone(&self.parameters),
        }
    }
}

#[derive(Clone)]
pub struct ApiVersionService<S> {
    inner: S,
    headers: Arc<[HeaderName]>,
    parameters: Arc<[String]>,
}

impl<S> ApiVersionService<S> {
    fn apply<B>(&self, req: &mut Request<B>, version: &ApiVersion) -> Result<(), RestError> {
        if !self.headers.is_empty() {
            let value = HeaderValue::from_str(version.as_str())?;
            for name in self.headers.iter() {
                req.headers_mut()
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        if !self.parameters.is_empty() {
            *req.uri_mut() = with_version_parameters(req.uri(), &self.parameters, version)?;
        }
        Ok(())
    }
}

/// Append `name=version` for each parameter not already present in the query
fn with_version_parameters(
    uri: &Uri,
    parameters: &[String],
    version: &ApiVersion,
) -> Result<Uri, RestError> {
    let existing: Vec<(String, String)> = uri
        .query()
        .map(serde_urlencoded::from_str)
        .transpose()
        .map_err(|e| RestError::invalid_uri(uri.to_string(), e.to_string()))?
        .unwrap_or_default();

    let missing: Vec<(&str, &str)> = parameters
        .iter()
        .filter(|name| !existing.iter().any(|(k, _)| k == *name))
        .map(|name| (name.as_str(), version.as_str()))
        .collect();
    if missing.is_empty() {
        return Ok(uri.clone());
    }

    let appended = serde_urlencoded::to_string(&missing)?;
    let path_and_query = match uri.query() {
        Some(query) if !query.is_empty() => format!("{}?{query}&{appended}", uri.path()),
        _ => format!("{}?{appended}", uri.path()),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).map_err(http::Error::from)?);
    Uri::from_parts(parts).map_err(|e| RestError::RequestBuild(e.into()))
}

type BoxErrorFn<E> = fn(E) -> BoxError;

/// A request whose label cannot be applied fails here instead of going out
/// unversioned.
impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ApiVersionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Into<BoxError>,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Either<
        Ready<Result<Self::Response, BoxError>>,
        MapErr<S::Future, BoxErrorFn<S::Error>>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        if let Some(version) = req.extensions().get::<ApiVersion>().cloned() {
            tracing::trace!(version = %version, "applying api version");
            if let Err(e) = self.apply(&mut req, &version) {
                tracing::debug!(version = %version, error = %e, "api version not applied");
                return Either::Left(future::ready(Err(e.into())));
            }
        }
        let to_box: BoxErrorFn<S::Error> = Into::into;
        Either::Right(self.inner.call(req).map_err(to_box))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;
    use tower::ServiceExt;

    /// Returns the request head it received so tests can inspect it
    #[derive(Clone)]
    struct Capture;

    impl Service<Request<Full<Bytes>>> for Capture {
        type Response = Response<http::request::Parts>;
        type Error = std::convert::Infallible;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            let (parts, _) = req.into_parts();
            std::future::ready(Ok(Response::new(parts)))
        }
    }

    fn versioned(uri: &str, version: Option<&str>) -> Request<Full<Bytes>> {
        let mut req = Request::builder()
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap();
        if let Some(v) = version {
            req.extensions_mut().insert(ApiVersion::new(v).unwrap());
        }
        req
    }

    async fn run(config: &VersioningConfig, req: Request<Full<Bytes>>) -> http::request::Parts {
        let service = ApiVersionLayer::try_new(config).unwrap().layer(Capture);
        service.oneshot(req).await.unwrap().into_body()
    }

    #[tokio::test]
    async fn test_default_config_sets_header() {
        let parts = run(
            &VersioningConfig::default(),
            versioned("http://localhost/hello/greeting/Fred", Some("2")),
        )
        .await;
        assert_eq!(parts.headers.get("x-api-version").unwrap(), "2");
        assert_eq!(parts.uri.query(), None);
    }

    #[tokio::test]
    async fn test_unversioned_request_untouched() {
        let parts = run(
            &VersioningConfig::default(),
            versioned("http://localhost/hello/greeting/Fred", None),
        )
        .await;
        assert!(parts.headers.get("x-api-version").is_none());
    }

    #[tokio::test]
    async fn test_caller_header_not_overwritten() {
        let mut req = versioned("http://localhost/hello", Some("2"));
        req.headers_mut()
            .insert("x-api-version", HeaderValue::from_static("7"));
        let parts = run(&VersioningConfig::default(), req).await;
        assert_eq!(parts.headers.get("x-api-version").unwrap(), "7");
    }

    #[tokio::test]
    async fn test_parameter_appended_to_existing_query() {
        let parts = run(
            &VersioningConfig::parameter("api-version"),
            versioned("http://localhost/hello?lang=en", Some("1")),
        )
        .await;
        assert_eq!(parts.uri.path(), "/hello");
        assert_eq!(parts.uri.query(), Some("lang=en&api-version=1"));
        assert!(parts.headers.get("x-api-version").is_none());
    }

    #[tokio::test]
    async fn test_parameter_not_duplicated() {
        let parts = run(
            &VersioningConfig::parameter("v"),
            versioned("http://localhost/hello?v=9", Some("1")),
        )
        .await;
        assert_eq!(parts.uri.query(), Some("v=9"));
    }

    #[tokio::test]
    async fn test_headers_and_parameters_together() {
        let config = VersioningConfig {
            headers: vec!["X-API-VERSION".to_owned(), "Accept-Version".to_owned()],
            parameters: vec!["api-version".to_owned()],
        };
        let parts = run(&config, versioned("http://localhost/hello", Some("2"))).await;
        assert_eq!(parts.headers.get("x-api-version").unwrap(), "2");
        assert_eq!(parts.headers.get("accept-version").unwrap(), "2");
        assert_eq!(parts.uri.query(), Some("api-version=2"));
    }

    #[tokio::test]
    async fn test_unappliable_parameter_fails_request() {
        // Authority-form targets have no path to carry a query.
        let service = ApiVersionLayer::try_new(&VersioningConfig::parameter("api-version"))
            .unwrap()
            .layer(Capture);
        let err = service
            .oneshot(versioned("localhost:8080", Some("1")))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RestError>(),
            Some(RestError::RequestBuild(_))
        ));
    }

    #[tokio::test]
    async fn test_authority_form_without_version_passes() {
        let parts = run(
            &VersioningConfig::parameter("api-version"),
            versioned("localhost:8080", None),
        )
        .await;
        assert_eq!(parts.uri.query(), None);
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        assert!(ApiVersionLayer::try_new(&VersioningConfig::header("not valid")).is_err());
    }
}
