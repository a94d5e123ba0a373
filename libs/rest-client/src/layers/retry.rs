use crate::config::{AttemptOutcome, RetryConfig};
use crate::error::RestError;
use crate::response::{ResponseBody, parse_retry_after};
use bytes::Bytes;
use http::{HeaderValue, Request, Response};
use http_body_util::{BodyExt, Full};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};

/// Set on retried attempts to the 1-based retry number
pub const RETRY_ATTEMPT_HEADER: &str = "X-Retry-Attempt";

/// Retries transport failures and retryable statuses with exponential backoff
#[derive(Clone)]
pub struct RetryLayer {
    config: RetryConfig,
    total_timeout: Option<Duration>,
}

impl RetryLayer {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            total_timeout: None,
        }
    }

    /// `total_timeout` bounds all attempts plus backoff sleeps, including an
    /// attempt still in flight when it runs out
    #[must_use]
    pub fn with_total_timeout(config: RetryConfig, total_timeout: Option<Duration>) -> Self {
        Self {
            config,
            total_timeout,
        }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            config: Arc::new(self.config.clone()),
            total_timeout: self.total_timeout,
        }
    }
}

/// See [`RetryLayer`].
///
/// After the last attempt a retryable status is returned as `Ok(response)`;
/// only transport, timeout and deadline failures surface as `Err`.
#[derive(Clone)]
pub struct RetryService<S> {
    inner: S,
    config: Arc<RetryConfig>,
    total_timeout: Option<Duration>,
}

/// Optional deadline across all attempts
#[derive(Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn start(budget: Option<Duration>) -> Option<Self> {
        budget.map(|budget| Self {
            at: Instant::now() + budget,
            budget,
        })
    }

    fn check(deadline: Option<Self>) -> Result<(), RestError> {
        match deadline {
            Some(d) if Instant::now() >= d.at => Err(RestError::DeadlineExceeded(d.budget)),
            _ => Ok(()),
        }
    }

    /// Cut an in-flight attempt short once the deadline passes
    async fn bound<T>(
        deadline: Option<Self>,
        attempt: impl Future<Output = Result<T, RestError>>,
    ) -> Result<T, RestError> {
        match deadline {
            Some(d) => tokio::time::timeout_at(d.at, attempt)
                .await
                .unwrap_or_else(|_| Err(RestError::DeadlineExceeded(d.budget))),
            None => attempt.await,
        }
    }

    /// Shorten `backoff` to the time left, failing when none is left
    fn clamp(deadline: Option<Self>, backoff: Duration) -> Result<Duration, RestError> {
        let Some(d) = deadline else {
            return Ok(backoff);
        };
        let remaining = d.at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(RestError::DeadlineExceeded(d.budget));
        }
        Ok(backoff.min(remaining))
    }
}

impl<S> Service<Request<Full<Bytes>>> for RetryService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = RestError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = S::Response;
    type Error = RestError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        // Consume the instance that was poll_ready'd.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let config = Arc::clone(&self.config);
        let deadline = Deadline::start(self.total_timeout);

        let (parts, body) = req.into_parts();

        Box::pin(async move {
            let host = parts
                .uri
                .authority()
                .map_or_else(|| "unknown".to_owned(), ToString::to_string);

            let mut attempt = 0usize;
            loop {
                Deadline::check(deadline)?;

                // `Parts::clone` drops extensions; the version label lives there.
                let mut req = Request::from_parts(parts.clone(), body.clone());
                *req.version_mut() = parts.version;
                *req.extensions_mut() = parts.extensions.clone();
                if attempt > 0
                    && let Ok(value) = HeaderValue::try_from(attempt.to_string())
                {
                    req.headers_mut().insert(RETRY_ATTEMPT_HEADER, value);
                }

                let mut svc = inner.clone();
                let outcome = Deadline::bound(deadline, async move {
                    svc.ready().await?;
                    svc.call(req).await
                })
                .await;

                let retries_left = attempt < config.max_retries;
                let backoff = match &outcome {
                    Ok(resp) => {
                        let outcome_kind = AttemptOutcome::Status(resp.status());
                        if !retries_left || !config.should_retry(outcome_kind, &parts.method) {
                            return outcome;
                        }
                        let retry_after = parse_retry_after(resp.headers())
                            .filter(|_| config.honor_retry_after);
                        tracing::debug!(
                            retry = attempt + 1,
                            max_retries = config.max_retries,
                            status = resp.status().as_u16(),
                            method = %parts.method,
                            host = %host,
                            retry_after_used = retry_after.is_some(),
                            "retrying request after status"
                        );
                        retry_after.unwrap_or_else(|| config.backoff.delay(attempt))
                    }
                    Err(err) => {
                        let outcome_kind = attempt_outcome(err);
                        if !retries_left || !config.should_retry(outcome_kind, &parts.method) {
                            return outcome;
                        }
                        tracing::debug!(
                            retry = attempt + 1,
                            max_retries = config.max_retries,
                            error = %err,
                            method = %parts.method,
                            host = %host,
                            "retrying request after error"
                        );
                        config.backoff.delay(attempt)
                    }
                };

                if let Ok(resp) = outcome {
                    release_connection(resp, &config).await;
                }

                tokio::time::sleep(Deadline::clamp(deadline, backoff)?).await;
                attempt += 1;
            }
        })
    }
}

/// Drain a discarded response so its HTTP/1.1 connection can return to the pool.
///
/// Bodies declared larger than the drain limit are dropped instead.
async fn release_connection(resp: Response<ResponseBody>, config: &RetryConfig) {
    let Some(limit) = config.drain_limit else {
        return;
    };
    let declared = resp
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        tracing::trace!(content_length = ?declared, limit, "skipping drain of large body");
        return;
    }

    let mut body = std::pin::pin!(resp.into_body());
    let mut drained = 0usize;
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                drained += frame.data_ref().map_or(0, Bytes::len);
                if drained >= limit {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to drain body before retry");
                break;
            }
        }
    }
}

fn attempt_outcome(err: &RestError) -> AttemptOutcome {
    match err {
        RestError::Transport(_) => AttemptOutcome::Transport,
        RestError::Timeout(_) => AttemptOutcome::Timeout,
        _ => AttemptOutcome::Fatal,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::Backoff;
    use crate::version::ApiVersion;
    use http::{Method, StatusCode};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Step {
        Status(StatusCode, Option<&'static str>),
        Refused,
        Malformed,
    }

    /// Replays a fixed script of outcomes and records what it saw
    #[derive(Clone)]
    struct Scripted {
        steps: Arc<Mutex<VecDeque<Step>>>,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<(Option<String>, Option<ApiVersion>)>>>,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Arc::new(Mutex::new(steps.into())),
                calls: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn body(text: &'static str) -> ResponseBody {
        Full::new(Bytes::from_static(text.as_bytes()))
            .map_err(|never| match never {})
            .boxed()
    }

    impl Service<Request<Full<Bytes>>> for Scripted {
        type Response = Response<ResponseBody>;
        type Error = RestError;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((
                req.headers()
                    .get(RETRY_ATTEMPT_HEADER)
                    .map(|v| v.to_str().unwrap().to_owned()),
                req.extensions().get::<ApiVersion>().cloned(),
            ));
            let step = self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Step::Status(StatusCode::OK, None));
            std::future::ready(match step {
                Step::Status(status, retry_after) => {
                    let mut builder = Response::builder().status(status);
                    if let Some(value) = retry_after {
                        builder = builder.header(http::header::RETRY_AFTER, value);
                    }
                    Ok(builder.body(body("payload")).unwrap())
                }
                Step::Refused => Err(RestError::Transport(Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                )))),
                Step::Malformed => Err(RestError::Json(
                    serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
                )),
            })
        }
    }

    fn fast_config(max_retries: usize) -> RetryConfig {
        RetryConfig {
            max_retries,
            backoff: Backoff::fast(),
            ..RetryConfig::default()
        }
    }

    fn request(method: Method) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri("http://localhost/hello/greeting/Fred")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn run(
        config: RetryConfig,
        script: &Scripted,
        req: Request<Full<Bytes>>,
    ) -> Result<Response<ResponseBody>, RestError> {
        RetryLayer::new(config)
            .layer(script.clone())
            .oneshot(req)
            .await
    }

    #[tokio::test]
    async fn test_get_retried_on_503_then_succeeds() {
        let script = Scripted::new(vec![
            Step::Status(StatusCode::SERVICE_UNAVAILABLE, None),
            Step::Status(StatusCode::OK, None),
        ]);
        let resp = run(fast_config(3), &script, request(Method::GET)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test]
    async fn test_post_not_retried_on_500() {
        let script = Scripted::new(vec![Step::Status(StatusCode::INTERNAL_SERVER_ERROR, None)]);
        let resp = run(fast_config(3), &script, request(Method::POST)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn test_post_retried_on_429() {
        let script = Scripted::new(vec![Step::Status(StatusCode::TOO_MANY_REQUESTS, None)]);
        let resp = run(fast_config(2), &script, request(Method::POST)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test]
    async fn test_post_not_retried_on_transport_error() {
        let script = Scripted::new(vec![Step::Refused]);
        let err = run(fast_config(2), &script, request(Method::POST)).await.unwrap_err();
        assert!(matches!(err, RestError::Transport(_)));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn test_not_found_passes_through() {
        let script = Scripted::new(vec![Step::Status(StatusCode::NOT_FOUND, None)]);
        let resp = run(fast_config(3), &script, request(Method::GET)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_response() {
        let script = Scripted::new(vec![
            Step::Status(StatusCode::BAD_GATEWAY, None),
            Step::Status(StatusCode::BAD_GATEWAY, None),
            Step::Status(StatusCode::BAD_GATEWAY, None),
        ]);
        let resp = run(fast_config(2), &script, request(Method::GET)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(script.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_transport_retries_return_error() {
        let script = Scripted::new(vec![Step::Refused, Step::Refused]);
        let err = run(fast_config(1), &script, request(Method::GET)).await.unwrap_err();
        assert!(matches!(err, RestError::Transport(_)));
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test]
    async fn test_json_errors_not_retried() {
        let script = Scripted::new(vec![Step::Malformed]);
        let err = run(fast_config(3), &script, request(Method::GET)).await.unwrap_err();
        assert!(matches!(err, RestError::Json(_)));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn test_attempt_header_and_version_extension_on_retry() {
        let script = Scripted::new(vec![Step::Refused, Step::Refused]);
        let mut req = request(Method::GET);
        req.extensions_mut().insert(ApiVersion::new("2").unwrap());
        run(fast_config(3), &script, req).await.unwrap();

        let seen = script.seen.lock().unwrap().clone();
        let attempts: Vec<_> = seen.iter().map(|(a, _)| a.clone()).collect();
        assert_eq!(
            attempts,
            vec![None, Some("1".to_owned()), Some("2".to_owned())]
        );
        assert!(
            seen.iter()
                .all(|(_, v)| v.as_ref().map(ApiVersion::as_str) == Some("2"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_header_used() {
        let script = Scripted::new(vec![Step::Status(StatusCode::TOO_MANY_REQUESTS, Some("5"))]);
        let started = Instant::now();
        run(fast_config(1), &script, request(Method::GET)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_ignored_when_configured() {
        let script = Scripted::new(vec![Step::Status(StatusCode::TOO_MANY_REQUESTS, Some("5"))]);
        let config = RetryConfig {
            honor_retry_after: false,
            ..fast_config(1)
        };
        let started = Instant::now();
        run(config, &script, request(Method::GET)).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_timeout_exceeded_during_backoff() {
        let script = Scripted::new(vec![
            Step::Status(StatusCode::TOO_MANY_REQUESTS, Some("30")),
            Step::Status(StatusCode::TOO_MANY_REQUESTS, Some("30")),
        ]);
        let err = RetryLayer::with_total_timeout(fast_config(3), Some(Duration::from_secs(1)))
            .layer(script.clone())
            .oneshot(request(Method::GET))
            .await
            .unwrap_err();
        assert!(matches!(err, RestError::DeadlineExceeded(d) if d == Duration::from_secs(1)));
    }

    /// Answers `200 late` after the given delay
    #[derive(Clone)]
    struct Slow(Duration);

    impl Service<Request<Full<Bytes>>> for Slow {
        type Response = Response<ResponseBody>;
        type Error = RestError;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _: Request<Full<Bytes>>) -> Self::Future {
            let delay = self.0;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(Response::new(body("late")))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_timeout_cuts_in_flight_attempt() {
        for max_retries in [0, 3] {
            let started = Instant::now();
            let err = RetryLayer::with_total_timeout(
                fast_config(max_retries),
                Some(Duration::from_millis(200)),
            )
            .layer(Slow(Duration::from_millis(1500)))
            .oneshot(request(Method::GET))
            .await
            .unwrap_err();
            assert!(
                matches!(err, RestError::DeadlineExceeded(d) if d == Duration::from_millis(200)),
                "max_retries={max_retries}: {err:?}"
            );
            assert!(started.elapsed() < Duration::from_millis(1500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_within_total_timeout_completes() {
        let resp = RetryLayer::with_total_timeout(fast_config(0), Some(Duration::from_secs(2)))
            .layer(Slow(Duration::from_millis(500)))
            .oneshot(request(Method::GET))
            .await
            .unwrap();
        let text = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(text, Bytes::from_static(b"late"));
    }
}
