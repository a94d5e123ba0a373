use crate::error::RestError;
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use std::time::{Duration, SystemTime};

/// Bytes of a non-2xx body kept in `RestError::HttpStatus`
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Parse `Retry-After` as delta-seconds or an HTTP-date (RFC 9110 §10.2.3).
///
/// Negative values, unparsable values and dates in the past yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<i64>() {
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }

    httpdate::parse_http_date(value)
        .ok()?
        .duration_since(SystemTime::now())
        .ok()
}

/// Type-erased, already decompressed response body
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Response with reqwest-style body readers.
///
/// `text`, `json` and `checked_bytes` fail on non-2xx statuses; `bytes` does not.
/// Every reader enforces `max_body_size` on decompressed bytes.
#[derive(Debug)]
pub struct RestResponse {
    pub(crate) inner: Response<ResponseBody>,
    pub(crate) max_body_size: usize,
}

impl RestResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Fail on non-2xx without reading the body.
    ///
    /// # Errors
    /// Returns `RestError::HttpStatus` with an empty preview if the status is not 2xx.
    pub fn error_for_status(self) -> Result<Self, RestError> {
        if self.inner.status().is_success() {
            return Ok(self);
        }
        Err(RestError::HttpStatus {
            status: self.inner.status(),
            body_preview: String::new(),
            retry_after: parse_retry_after(self.inner.headers()),
        })
    }

    /// Read the body without checking the status.
    ///
    /// # Errors
    /// Returns `RestError::BodyTooLarge` if the body exceeds the limit.
    pub async fn bytes(self) -> Result<Bytes, RestError> {
        read_body_limited(self.inner, self.max_body_size).await
    }

    /// # Errors
    /// Returns `RestError::HttpStatus` for non-2xx statuses and
    /// `RestError::BodyTooLarge` if the body exceeds the limit.
    pub async fn checked_bytes(self) -> Result<Bytes, RestError> {
        checked_body(self.inner, self.max_body_size).await
    }

    /// Read the body as UTF-8, replacing invalid sequences.
    ///
    /// # Errors
    /// Same as [`checked_bytes`](Self::checked_bytes).
    pub async fn text(self) -> Result<String, RestError> {
        let body = checked_body(self.inner, self.max_body_size).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// # Errors
    /// Same as [`checked_bytes`](Self::checked_bytes), plus `RestError::Json`.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, RestError> {
        let body = checked_body(self.inner, self.max_body_size).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Raw body stream. Does not enforce `max_body_size` or check the status.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.inner.into_body()
    }
}

pub(crate) async fn checked_body(
    response: Response<ResponseBody>,
    max_body_size: usize,
) -> Result<Bytes, RestError> {
    let status = response.status();
    if status.is_success() {
        return read_body_limited(response, max_body_size).await;
    }

    let retry_after = parse_retry_after(response.headers());
    let preview_limit = max_body_size.min(ERROR_BODY_PREVIEW_LIMIT);
    // An oversized error body must not hide the status.
    let body_preview = match read_body_limited(response, preview_limit).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(RestError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
        Err(e) => return Err(e),
    };

    Err(RestError::HttpStatus {
        status,
        body_preview,
        retry_after,
    })
}

/// Collect at most `limit` bytes of the body
pub(crate) async fn read_body_limited(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<Bytes, RestError> {
    let mut body = std::pin::pin!(response.into_body());
    let mut collected = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(RestError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            let actual = collected.len() + chunk.len();
            if actual > limit {
                return Err(RestError::BodyTooLarge { limit, actual });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}
