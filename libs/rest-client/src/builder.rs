use crate::client::{BufferedService, RestClient};
use crate::config::{PoolConfig, RestClientConfig, RetryConfig, RootStore, TransportSecurity};
use crate::error::RestError;
use crate::layers::{ApiVersionLayer, DefaultHeadersLayer, RetryLayer};
use crate::response::ResponseBody;
use crate::tls::{self, Connector};
use crate::version::VersioningConfig;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;
use tower::buffer::Buffer;
use tower::limit::ConcurrencyLimitLayer;
use tower::load_shed::LoadShedLayer;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{Layer, ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

type StackService = BoxCloneService<Request<Full<Bytes>>, Response<ResponseBody>, RestError>;

type HyperClient = Client<Connector, Full<Bytes>>;

/// Builder for [`RestClient`].
///
/// `build()` spawns the buffer worker and must run inside a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct RestClientBuilder {
    config: RestClientConfig,
}

impl RestClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: RestClientConfig) -> Self {
        Self { config }
    }

    /// Per-attempt timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.config.total_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Header sent on every request the caller does not set itself
    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((name.into(), value.into()));
        self
    }

    /// `None` disables retries
    #[must_use]
    pub fn retry(mut self, retry: Option<RetryConfig>) -> Self {
        self.config.retry = retry;
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    #[must_use]
    pub fn max_concurrent_requests(mut self, limit: Option<usize>) -> Self {
        self.config.max_concurrent_requests = limit;
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    #[must_use]
    pub fn root_store(mut self, root_store: RootStore) -> Self {
        self.config.root_store = root_store;
        self
    }

    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    /// Where versioned requests put their label
    #[must_use]
    pub fn versioning(mut self, versioning: VersioningConfig) -> Self {
        self.config.versioning = versioning;
        self
    }

    /// Accept `http://` URLs. Debug builds or the `allow-insecure-http` feature only.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(self) -> Self {
        self.transport(TransportSecurity::AllowInsecureHttp)
    }

    /// Queue size in front of the stack; 0 is clamped to 1
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity.max(1);
        self
    }

    /// Assemble the middleware stack, outer to inner:
    ///
    /// `Buffer → LoadShed + ConcurrencyLimit → Retry → Timeout → ApiVersion →
    /// DefaultHeaders → Decompression → hyper`
    ///
    /// Every retry attempt passes through `ApiVersion` again, so the label is
    /// re-applied from the request extensions.
    ///
    /// # Errors
    /// Returns `RestError` for an invalid default header or version header
    /// name, or when the TLS roots cannot be loaded.
    pub fn build(self) -> Result<RestClient, RestError> {
        let config = self.config;
        if config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!("plain HTTP allowed; this client is for tests against mock servers");
        }

        let service = attempt_stack(&config, hyper_client(&config)?)?;
        let service = with_retry(service, &config);
        let service = with_overload_guard(service, config.max_concurrent_requests);
        let buffered: BufferedService = Buffer::new(service, config.buffer_capacity.max(1));

        tracing::debug!(
            request_timeout = ?config.request_timeout,
            total_timeout = ?config.total_timeout,
            retries = config.retry.as_ref().map_or(0, |r| r.max_retries),
            version_headers = ?config.versioning.headers,
            version_parameters = ?config.versioning.parameters,
            "rest client ready"
        );

        Ok(RestClient {
            service: buffered,
            max_body_size: config.max_body_size,
            transport_security: config.transport,
        })
    }
}

fn hyper_client(config: &RestClientConfig) -> Result<HyperClient, RestError> {
    let connector = tls::connector(config.root_store, config.transport)?;
    let mut builder = Client::builder(TokioExecutor::new());
    // The idle timeout needs a timer to fire.
    builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.pool.max_idle_per_host);
    if let Some(idle) = config.pool.idle_timeout {
        builder.pool_idle_timeout(idle);
    }
    Ok(builder.build(connector))
}

/// Layers applied to each individual attempt
fn attempt_stack(config: &RestClientConfig, client: HyperClient) -> Result<StackService, RestError> {
    let timeout = config.request_timeout;
    let headers = DefaultHeadersLayer::try_new(&config.user_agent, &config.default_headers)?;
    let version = ApiVersionLayer::try_new(&config.versioning)?;

    Ok(ServiceBuilder::new()
        .layer(TimeoutLayer::new(timeout))
        .layer(version)
        .layer(headers)
        .layer(DecompressionLayer::new())
        .service(client)
        .map_response(erase_body)
        .map_err(move |e: tower::BoxError| into_rest_error(e, timeout))
        .boxed_clone())
}

/// Retries, plus the overall deadline; a single attempt still gets the deadline
fn with_retry(service: StackService, config: &RestClientConfig) -> StackService {
    let retry = match (&config.retry, config.total_timeout) {
        (Some(retry), _) => retry.clone(),
        (None, Some(_)) => RetryConfig::with_max_retries(0),
        (None, None) => return service,
    };
    RetryLayer::with_total_timeout(retry, config.total_timeout)
        .layer(service)
        .boxed_clone()
}

/// Fail fast with `Overloaded` once `limit` requests are in flight
fn with_overload_guard(service: StackService, limit: Option<usize>) -> StackService {
    let Some(limit) = limit else {
        return service;
    };
    ServiceBuilder::new()
        .layer(LoadShedLayer::new())
        .layer(ConcurrencyLimitLayer::new(limit.max(1)))
        .service(service)
        .map_err(|e: tower::BoxError| into_rest_error(e, Duration::ZERO))
        .boxed_clone()
}

/// Recover the `RestError` boxed by tower middleware, or classify tower's own errors
fn into_rest_error(err: tower::BoxError, attempt_timeout: Duration) -> RestError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return RestError::Timeout(attempt_timeout);
    }
    if err.is::<tower::load_shed::error::Overloaded>() {
        return RestError::Overloaded;
    }
    err.downcast::<RestError>()
        .map_or_else(RestError::Transport, |rest| *rest)
}

fn erase_body<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    response.map(|body| body.map_err(Into::into).boxed())
}
