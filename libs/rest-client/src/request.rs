use crate::client::{BufferedService, map_buffer_error, try_acquire_buffer_slot};
use crate::config::TransportSecurity;
use crate::error::RestError;
use crate::response::RestResponse;
use crate::version::ApiVersion;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request, Uri};
use http_body_util::Full;
use serde::Serialize;
use tower::Service;

#[derive(Debug)]
enum Payload {
    Empty,
    Text(Bytes),
    Json(Bytes),
}

impl Payload {
    fn content_type(&self) -> Option<HeaderValue> {
        match self {
            Self::Empty => None,
            Self::Text(_) => Some(HeaderValue::from_static("text/plain; charset=utf-8")),
            Self::Json(_) => Some(HeaderValue::from_static("application/json")),
        }
    }

    fn into_bytes(self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Text(bytes) | Self::Json(bytes) => bytes,
        }
    }
}

/// Request under construction.
///
/// The first invalid header or query value is kept and returned by
/// [`send`](Self::send), so calls chain without intermediate `?`.
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    service: BufferedService,
    max_body_size: usize,
    transport_security: TransportSecurity,
    method: Method,
    url: String,
    query: String,
    headers: HeaderMap,
    version: Option<ApiVersion>,
    payload: Payload,
    error: Option<RestError>,
}

impl RequestBuilder {
    pub(crate) fn new(
        service: BufferedService,
        max_body_size: usize,
        transport_security: TransportSecurity,
        method: Method,
        url: String,
    ) -> Self {
        Self {
            service,
            max_body_size,
            transport_security,
            method,
            url,
            query: String::new(),
            headers: HeaderMap::new(),
            version: None,
            payload: Payload::Empty,
            error: None,
        }
    }

    fn fail(mut self, err: impl Into<RestError>) -> Self {
        if self.error.is_none() {
            self.error = Some(err.into());
        }
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        let name = match HeaderName::try_from(name) {
            Ok(name) => name,
            Err(e) => return self.fail(e),
        };
        match HeaderValue::try_from(value) {
            Ok(value) => {
                self.headers.append(name, value);
                self
            }
            Err(e) => self.fail(e),
        }
    }

    /// Append URL-encoded query pairs, e.g. `&[("lang", "en")]`
    pub fn query<T: Serialize + ?Sized>(mut self, pairs: &T) -> Self {
        match serde_urlencoded::to_string(pairs) {
            Ok(encoded) => {
                if !encoded.is_empty() {
                    if !self.query.is_empty() {
                        self.query.push('&');
                    }
                    self.query.push_str(&encoded);
                }
                self
            }
            Err(e) => self.fail(e),
        }
    }

    /// Ask for a specific API version.
    ///
    /// Where the label goes (headers, query parameters, or both) is decided by
    /// the client's [`VersioningConfig`](crate::VersioningConfig).
    pub fn version(mut self, version: ApiVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// JSON body; `Content-Type: application/json` unless the caller set one.
    ///
    /// # Errors
    /// Returns an earlier builder error or `RestError::Json`.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, RestError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.payload = Payload::Json(serde_json::to_vec(body)?.into());
        Ok(self)
    }

    /// UTF-8 text body; `Content-Type: text/plain; charset=utf-8` unless the caller set one.
    pub fn body_string(mut self, body: String) -> Self {
        self.payload = Payload::Text(body.into());
        self
    }

    /// Send through the client's middleware stack.
    ///
    /// Non-2xx statuses come back as `Ok`; the response's checked readers
    /// turn them into errors.
    ///
    /// # Errors
    /// Returns `RestError` for builder errors, rejected URLs, transport
    /// failures, timeouts and overload.
    pub async fn send(mut self) -> Result<RestResponse, RestError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let uri = resolve_target(&self.url, &self.query, self.transport_security)?;

        let mut headers = self.headers;
        if let Some(content_type) = self.payload.content_type() {
            headers.entry(CONTENT_TYPE).or_insert(content_type);
        }

        let mut request = Request::new(Full::new(self.payload.into_bytes()));
        *request.method_mut() = self.method;
        *request.uri_mut() = uri;
        *request.headers_mut() = headers;
        if let Some(version) = self.version {
            request.extensions_mut().insert(version);
        }

        try_acquire_buffer_slot(&mut self.service).await?;
        let inner = self.service.call(request).await.map_err(map_buffer_error)?;

        Ok(RestResponse {
            inner,
            max_body_size: self.max_body_size,
        })
    }
}

/// Join `url` and `query`, then require an absolute URL whose scheme the
/// transport security mode accepts.
fn resolve_target(
    url: &str,
    query: &str,
    transport_security: TransportSecurity,
) -> Result<Uri, RestError> {
    let target = match (query.is_empty(), url.contains('?')) {
        (true, _) => url.to_owned(),
        (false, true) => format!("{url}&{query}"),
        (false, false) => format!("{url}?{query}"),
    };
    let uri: Uri = target
        .parse()
        .map_err(|e: http::uri::InvalidUri| RestError::invalid_uri(&target, e.to_string()))?;

    let Some(scheme) = uri.scheme_str() else {
        return Err(RestError::invalid_uri(target, "relative URL, scheme and host required"));
    };
    if uri.authority().is_none() {
        return Err(RestError::invalid_uri(target, "no host"));
    }
    match (scheme, transport_security) {
        ("https", _) | ("http", TransportSecurity::AllowInsecureHttp) => Ok(uri),
        ("http", TransportSecurity::TlsOnly) => Err(RestError::InvalidScheme {
            scheme: scheme.to_owned(),
            reason: "HTTPS required".to_owned(),
        }),
        (other, _) => Err(RestError::InvalidScheme {
            scheme: other.to_owned(),
            reason: "only http and https are supported".to_owned(),
        }),
    }
}
