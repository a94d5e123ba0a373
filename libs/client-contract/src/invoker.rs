use crate::descriptor::{ClientDescriptor, ReturnMode};
use crate::error::InvokeError;
use crate::runtime::{ClientRuntime, Deferred};
use rest_client::{ApiVersion, RestClient, RestClientBuilder, RestClientConfig, RestError};
use tracing::Instrument;
use url::Url;

/// A described operation bound to concrete arguments
#[derive(Debug, Clone)]
pub struct ResolvedCall {
    pub client: &'static str,
    pub operation: &'static str,
    pub method: http::Method,
    pub url: Url,
    pub version: Option<ApiVersion>,
    pub return_mode: ReturnMode,
}

/// Executes operations of any [`ClientDescriptor`] against one base URL.
///
/// Requests run on the invoker's [`ClientRuntime`]; the [`RestClient`]
/// decides how the resolved version travels on the wire.
#[derive(Clone)]
pub struct ClientInvoker {
    client: RestClient,
    base_url: Url,
    runtime: ClientRuntime,
}

impl ClientInvoker {
    /// Wrap an existing client. It must have been built inside `runtime`.
    ///
    /// # Errors
    /// Returns `InvokeError::InvalidBaseUrl` if `base_url` cannot carry a path.
    pub fn new(
        client: RestClient,
        base_url: &str,
        runtime: ClientRuntime,
    ) -> Result<Self, InvokeError> {
        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
            runtime,
        })
    }

    /// Build a [`RestClient`] from `config` inside `runtime` and wrap it.
    ///
    /// # Errors
    /// Returns `InvokeError::InvalidBaseUrl` or the client construction error.
    pub fn from_config(
        base_url: &str,
        config: RestClientConfig,
        runtime: ClientRuntime,
    ) -> Result<Self, InvokeError> {
        let base_url = parse_base_url(base_url)?;
        let client = {
            let _guard = runtime.enter();
            RestClientBuilder::with_config(config).build()?
        };
        tracing::info!(base_url = %base_url, "client invoker ready");
        Ok(Self {
            client,
            base_url,
            runtime,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn runtime(&self) -> &ClientRuntime {
        &self.runtime
    }

    /// Find the operation, expand its path and compute its effective version.
    ///
    /// # Errors
    /// Returns `UnknownOperation`, `Template` or `Version`.
    pub fn resolve(
        &self,
        descriptor: &'static ClientDescriptor,
        operation: &str,
        vars: &[(&str, &str)],
    ) -> Result<ResolvedCall, InvokeError> {
        let op = descriptor
            .operation(operation)
            .ok_or_else(|| InvokeError::UnknownOperation {
                client: descriptor.id.to_owned(),
                operation: operation.to_owned(),
            })?;

        let path = descriptor.path_template(op)?.expand(vars)?;
        let version = descriptor
            .effective_version(op)
            .map(ApiVersion::new)
            .transpose()
            .map_err(InvokeError::Version)?;

        let mut url = self.base_url.clone();
        url.set_path(&format!("{}{path}", self.base_url.path().trim_end_matches('/')));

        Ok(ResolvedCall {
            client: descriptor.id,
            operation: op.name,
            method: op.method.clone(),
            url,
            version,
            return_mode: op.return_mode,
        })
    }

    fn resolve_as(
        &self,
        descriptor: &'static ClientDescriptor,
        operation: &str,
        vars: &[(&str, &str)],
        requested: ReturnMode,
    ) -> Result<ResolvedCall, InvokeError> {
        let call = self.resolve(descriptor, operation, vars)?;
        if call.return_mode != requested {
            return Err(InvokeError::ReturnModeMismatch {
                operation: call.operation.to_owned(),
                declared: call.return_mode,
                requested,
            });
        }
        Ok(call)
    }

    /// Execute any operation and await its text body, regardless of its declared return mode.
    ///
    /// # Errors
    /// Resolution errors, transport errors, or `InvokeError::Status` for non-2xx.
    pub async fn invoke_text(
        &self,
        descriptor: &'static ClientDescriptor,
        operation: &str,
        vars: &[(&str, &str)],
    ) -> Result<String, InvokeError> {
        let call = self.resolve(descriptor, operation, vars)?;
        self.runtime.spawn(send_text(self.client.clone(), call)).await
    }

    /// Execute a `Blocking` operation, parking the current thread until it completes.
    ///
    /// # Errors
    /// `ReturnModeMismatch` for deferred operations, otherwise as [`invoke_text`](Self::invoke_text).
    pub fn call_blocking(
        &self,
        descriptor: &'static ClientDescriptor,
        operation: &str,
        vars: &[(&str, &str)],
    ) -> Result<String, InvokeError> {
        let call = self.resolve_as(descriptor, operation, vars, ReturnMode::Blocking)?;
        self.runtime.block_on(send_text(self.client.clone(), call))
    }

    /// Start a `Deferred` operation and return its pending result.
    ///
    /// Resolution errors, including `ReturnModeMismatch`, are delivered through the
    /// returned future.
    pub fn call_deferred(
        &self,
        descriptor: &'static ClientDescriptor,
        operation: &str,
        vars: &[(&str, &str)],
    ) -> Deferred<String, InvokeError> {
        match self.resolve_as(descriptor, operation, vars, ReturnMode::Deferred) {
            Ok(call) => self.runtime.spawn(send_text(self.client.clone(), call)),
            Err(e) => Box::pin(futures::future::ready(Err(e))),
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url, InvokeError> {
    let url = Url::parse(raw).map_err(|e| InvokeError::InvalidBaseUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(InvokeError::InvalidBaseUrl {
            url: raw.to_owned(),
            reason: "URL cannot carry a path".to_owned(),
        });
    }
    Ok(url)
}

async fn send_text(client: RestClient, call: ResolvedCall) -> Result<String, InvokeError> {
    let span = tracing::debug_span!(
        "invoke",
        client = call.client,
        operation = call.operation,
        method = %call.method,
        url = %call.url,
        version = call.version.as_ref().map(ApiVersion::as_str),
    );

    async move {
        let mut request = client.request(call.method, call.url.as_str());
        if let Some(version) = call.version.clone() {
            request = request.version(version);
        }
        let response = request.send().await?;
        let status = response.status();

        match response.text().await {
            Ok(body) => {
                tracing::debug!(status = status.as_u16(), "operation completed");
                Ok(body)
            }
            Err(RestError::HttpStatus {
                status,
                body_preview,
                ..
            }) => {
                tracing::debug!(status = status.as_u16(), "operation failed with status");
                Err(InvokeError::Status {
                    status,
                    body: body_preview,
                    version: call.version,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::descriptor::OperationDescriptor;

    static ECHO: ClientDescriptor = ClientDescriptor {
        id: "echo",
        base_path: "/echo",
        default_version: Some("1"),
        operations: &[
            OperationDescriptor {
                name: "now",
                method: http::Method::GET,
                path: "/{word}",
                version: None,
                return_mode: ReturnMode::Blocking,
            },
            OperationDescriptor {
                name: "later",
                method: http::Method::GET,
                path: "/{word}",
                version: Some("2"),
                return_mode: ReturnMode::Deferred,
            },
        ],
    };

    fn invoker(base: &str) -> ClientInvoker {
        let runtime = ClientRuntime::new(1, "invoker-test").unwrap();
        ClientInvoker::from_config(base, RestClientConfig::for_testing(), runtime).unwrap()
    }

    #[test]
    fn test_resolve_inherits_default_version() {
        let call = invoker("http://localhost:8080")
            .resolve(&ECHO, "now", &[("word", "hi")])
            .unwrap();
        assert_eq!(call.url.as_str(), "http://localhost:8080/echo/hi");
        assert_eq!(call.version.as_ref().map(ApiVersion::as_str), Some("1"));
        assert_eq!(call.return_mode, ReturnMode::Blocking);
    }

    #[test]
    fn test_resolve_explicit_version_and_base_prefix() {
        let call = invoker("http://localhost:8080/api/")
            .resolve(&ECHO, "later", &[("word", "a b")])
            .unwrap();
        assert_eq!(call.url.as_str(), "http://localhost:8080/api/echo/a%20b");
        assert_eq!(call.version.as_ref().map(ApiVersion::as_str), Some("2"));
    }

    #[test]
    fn test_resolve_errors() {
        let invoker = invoker("http://localhost:8080");
        assert!(matches!(
            invoker.resolve(&ECHO, "missing", &[]),
            Err(InvokeError::UnknownOperation { .. })
        ));
        assert!(matches!(
            invoker.resolve(&ECHO, "now", &[]),
            Err(InvokeError::Template(_))
        ));
    }

    #[test]
    fn test_return_mode_mismatch_both_ways() {
        let invoker = invoker("http://localhost:8080");
        let err = invoker
            .call_blocking(&ECHO, "later", &[("word", "x")])
            .unwrap_err();
        assert!(matches!(
            err,
            InvokeError::ReturnModeMismatch {
                declared: ReturnMode::Deferred,
                requested: ReturnMode::Blocking,
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "operation 'later' is declared deferred but was invoked blocking"
        );
        let deferred = invoker.call_deferred(&ECHO, "now", &[("word", "x")]);
        assert!(matches!(
            futures::executor::block_on(deferred),
            Err(InvokeError::ReturnModeMismatch {
                declared: ReturnMode::Blocking,
                requested: ReturnMode::Deferred,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_base_url() {
        let runtime = ClientRuntime::new(1, "invoker-test").unwrap();
        for bad in ["not a url", "mailto:someone@example.com"] {
            assert!(matches!(
                ClientInvoker::from_config(bad, RestClientConfig::for_testing(), runtime.clone()),
                Err(InvokeError::InvalidBaseUrl { .. })
            ));
        }
    }
}
