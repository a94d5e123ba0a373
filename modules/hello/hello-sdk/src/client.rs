use crate::api::HelloClient;
use crate::config::HelloClientConfig;
use crate::descriptor::{HELLO_CLIENT, NAME_VAR, SAY_HELLO, SAY_HELLO_TWO};
use crate::error::{ConfigError, HelloError};
use client_contract::{ClientInvoker, ClientRuntime, Deferred};
use futures::{FutureExt, TryFutureExt};

/// [`HelloClient`] over HTTP, driven by the static [`HELLO_CLIENT`] description
#[derive(Clone)]
pub struct HttpHelloClient {
    invoker: ClientInvoker,
}

impl HttpHelloClient {
    /// Build a client with its own runtime and connection pool.
    ///
    /// # Errors
    /// Returns `ConfigError` if the configuration is invalid or the runtime or
    /// HTTP client cannot be created.
    pub fn new(config: &HelloClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        HELLO_CLIENT.validate()?;

        let runtime = ClientRuntime::new(config.runtime_worker_threads, "hello-client")
            .map_err(ConfigError::Runtime)?;
        let invoker = ClientInvoker::from_config(
            &config.base_url,
            config.rest_config(HELLO_CLIENT.id),
            runtime,
        )
        .map_err(ConfigError::Client)?;

        Ok(Self::with_client(invoker))
    }

    /// Use an existing invoker, e.g. one shared with other clients
    #[must_use]
    pub fn with_client(invoker: ClientInvoker) -> Self {
        Self { invoker }
    }

    #[must_use]
    pub fn invoker(&self) -> &ClientInvoker {
        &self.invoker
    }
}

impl HelloClient for HttpHelloClient {
    fn say_hello(&self, name: &str) -> Result<String, HelloError> {
        self.invoker
            .call_blocking(&HELLO_CLIENT, SAY_HELLO, &[(NAME_VAR, name)])
            .map_err(HelloError::from)
    }

    fn say_hello_two(&self, name: &str) -> Deferred<String, HelloError> {
        self.invoker
            .call_deferred(&HELLO_CLIENT, SAY_HELLO_TWO, &[(NAME_VAR, name)])
            .map_err(HelloError::from)
            .boxed()
    }
}
