//! Client settings and their presets.

use crate::version::VersioningConfig;
use http::{Method, StatusCode};
use rand::Rng;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("hello-rest-client/", env!("CARGO_PKG_VERSION"));

const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Methods RFC 9110 defines as idempotent
#[must_use]
pub fn is_idempotent_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

/// Delay before retry `n` (0-based): `base * factor^n`, capped at `cap`,
/// plus up to 25% jitter when enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    /// Values below 1 or non-finite are treated as 1
    pub factor: f64,
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(10),
            factor: 2.0,
            jitter: true,
        }
    }
}

impl Backoff {
    /// Same delay before every retry
    #[must_use]
    pub fn constant(delay: Duration) -> Self {
        Self {
            base: delay,
            cap: delay,
            factor: 1.0,
            jitter: false,
        }
    }

    /// 1ms doubling up to 100ms, no jitter
    #[must_use]
    pub fn fast() -> Self {
        Self {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(100),
            factor: 2.0,
            jitter: false,
        }
    }

    #[must_use]
    pub fn delay(&self, retry: usize) -> Duration {
        let cap = self.cap.min(MAX_BACKOFF);
        let factor = if self.factor.is_finite() && self.factor >= 1.0 {
            self.factor
        } else {
            1.0
        };
        let scaled = self.base.as_secs_f64() * factor.powi(i32::try_from(retry).unwrap_or(i32::MAX));
        let delay = if scaled.is_finite() && scaled < cap.as_secs_f64() {
            Duration::from_secs_f64(scaled)
        } else {
            cap
        };
        if !self.jitter {
            return delay;
        }
        (delay + delay.mul_f64(rand::rng().random_range(0.0..=0.25))).min(cap)
    }
}

/// How an attempt ended, as seen by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Status(StatusCode),
    Transport,
    Timeout,
    /// Errors no retry can fix
    Fatal,
}

/// Which attempts are retried and how long to wait in between.
///
/// Idempotent methods are retried on `retry_statuses`, on transport errors
/// and on attempt timeouts. Every method is retried on `always_retry_statuses`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one
    pub max_retries: usize,

    pub backoff: Backoff,

    /// Default: 408, 500, 502, 503, 504
    pub retry_statuses: Vec<StatusCode>,

    /// Default: 429
    pub always_retry_statuses: Vec<StatusCode>,

    pub retry_transport_errors: bool,

    /// Wait as long as `Retry-After` asks instead of using the backoff
    pub honor_retry_after: bool,

    /// Bytes read from a discarded response so its connection can be reused.
    /// `None` drops it unread.
    pub drain_limit: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
            retry_statuses: vec![
                StatusCode::REQUEST_TIMEOUT,
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::GATEWAY_TIMEOUT,
            ],
            always_retry_statuses: vec![StatusCode::TOO_MANY_REQUESTS],
            retry_transport_errors: true,
            honor_retry_after: true,
            drain_limit: Some(64 * 1024),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn with_max_retries(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn should_retry(&self, outcome: AttemptOutcome, method: &Method) -> bool {
        match outcome {
            AttemptOutcome::Status(status) if self.always_retry_statuses.contains(&status) => true,
            AttemptOutcome::Status(status) => {
                is_idempotent_method(method) && self.retry_statuses.contains(&status)
            }
            AttemptOutcome::Transport | AttemptOutcome::Timeout => {
                self.retry_transport_errors && is_idempotent_method(method)
            }
            AttemptOutcome::Fatal => false,
        }
    }
}

/// Whether plain `http://` URLs are accepted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    #[default]
    TlsOnly,
    /// Local mock servers only
    AllowInsecureHttp,
}

/// Trust anchors for TLS server verification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum RootStore {
    /// Mozilla roots compiled into the binary
    #[default]
    WebPki,
    /// The operating system's certificate store
    Native,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// `None` keeps hyper-util's default
    pub idle_timeout: Option<Duration>,
    pub max_idle_per_host: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(90)),
            max_idle_per_host: 32,
        }
    }
}

/// Everything [`RestClientBuilder`](crate::RestClientBuilder) needs to assemble a client
#[derive(Debug, Clone)]
pub struct RestClientConfig {
    /// Per attempt; each retry gets a fresh one
    pub request_timeout: Duration,

    /// Across all attempts and backoff sleeps, retries or not. An attempt still
    /// in flight when it runs out is abandoned with `DeadlineExceeded`.
    pub total_timeout: Option<Duration>,

    /// Applied to decompressed bytes
    pub max_body_size: usize,

    pub user_agent: String,

    /// Sent on every request unless the caller sets the same header
    pub default_headers: Vec<(String, String)>,

    pub retry: Option<RetryConfig>,

    /// Requests in flight before new ones fail with `Overloaded`; `None` is unbounded
    pub max_concurrent_requests: Option<usize>,

    pub transport: TransportSecurity,

    pub root_store: RootStore,

    pub pool: PoolConfig,

    /// Requests queued in front of the stack
    pub buffer_capacity: usize,

    pub versioning: VersioningConfig,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            total_timeout: None,
            max_body_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            default_headers: Vec::new(),
            retry: Some(RetryConfig::default()),
            max_concurrent_requests: Some(100),
            transport: TransportSecurity::TlsOnly,
            root_store: RootStore::default(),
            pool: PoolConfig::default(),
            buffer_capacity: 1024,
            versioning: VersioningConfig::default(),
        }
    }
}

impl RestClientConfig {
    /// No retries, no concurrency limit, 10s timeout, 1 MiB bodies
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            retry: None,
            max_concurrent_requests: None,
            buffer_capacity: 256,
            pool: PoolConfig {
                idle_timeout: Some(Duration::from_secs(30)),
                max_idle_per_host: 8,
            },
            ..Self::default()
        }
    }

    /// [`minimal`](Self::minimal) plus plain HTTP, for mock servers.
    ///
    /// **WARNING**: never use outside tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            transport: TransportSecurity::AllowInsecureHttp,
            ..Self::minimal()
        }
    }
}
