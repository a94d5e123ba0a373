//! Layered client configuration.
//!
//! Sources, lowest to highest precedence:
//! 1. built-in defaults
//! 2. YAML file (optional)
//! 3. environment variables prefixed with `HELLO__`, nested with `__`
//!    (e.g. `HELLO__VERSIONING__DEFAULT__HEADERS=[X-Version]`)
//!
//! CLI overrides are applied by the caller on the extracted value.

use crate::error::ConfigError;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use rest_client::{RestClientConfig, RetryConfig, TransportSecurity, VersioningConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Prefix of environment variables read by [`HelloClientConfig::load`]
pub const ENV_PREFIX: &str = "HELLO__";

/// Connection and versioning settings of the hello client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HelloClientConfig {
    /// Scheme, host and optional path prefix of the hello service
    pub base_url: String,

    /// Overrides the default `User-Agent`
    pub user_agent: Option<String>,

    /// Per-attempt timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Deadline in milliseconds covering every attempt, retries or not
    pub total_timeout_ms: Option<u64>,

    /// 0 disables retries
    pub max_retries: usize,

    /// Permit `http://` base URLs. Local testing only.
    pub allow_insecure_http: bool,

    pub runtime_worker_threads: usize,

    pub versioning: VersioningSettings,
}

impl Default for HelloClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost:8443".to_owned(),
            user_agent: None,
            request_timeout_ms: 30_000,
            total_timeout_ms: None,
            max_retries: 3,
            allow_insecure_http: false,
            runtime_worker_threads: 2,
            versioning: VersioningSettings::default(),
        }
    }
}

/// Version signalling, with optional overrides per client id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VersioningSettings {
    pub default: VersioningConfig,
    pub clients: HashMap<String, VersioningConfig>,
}

impl VersioningSettings {
    #[must_use]
    pub fn for_client(&self, client_id: &str) -> &VersioningConfig {
        self.clients.get(client_id).unwrap_or(&self.default)
    }
}

impl HelloClientConfig {
    /// Load defaults, then `path` if given, then `HELLO__*` environment variables.
    ///
    /// # Errors
    /// Returns `ConfigError::NotFound` for a missing file and
    /// `ConfigError::Extract` for malformed or mistyped values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Yaml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Extract(Box::new(e)))?;

        tracing::debug!(
            base_url = %config.base_url,
            file = ?path,
            "hello client configuration loaded"
        );
        Ok(config)
    }

    /// # Errors
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.base_url).map_err(|e| ConfigError::Invalid {
            field: "base_url",
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "https" => {}
            "http" if self.allow_insecure_http => {}
            "http" => {
                return Err(ConfigError::Invalid {
                    field: "base_url",
                    reason: "http:// requires allow_insecure_http".to_owned(),
                });
            }
            other => {
                return Err(ConfigError::Invalid {
                    field: "base_url",
                    reason: format!("unsupported scheme '{other}', expected http or https"),
                });
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_ms",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.total_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                field: "total_timeout_ms",
                reason: "must be greater than zero when set".to_owned(),
            });
        }
        if self.runtime_worker_threads == 0 {
            return Err(ConfigError::Invalid {
                field: "runtime_worker_threads",
                reason: "must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }

    /// HTTP runtime settings for the client identified by `client_id`
    #[must_use]
    pub fn rest_config(&self, client_id: &str) -> RestClientConfig {
        let mut rest = RestClientConfig {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            total_timeout: self.total_timeout_ms.map(Duration::from_millis),
            retry: (self.max_retries > 0).then(|| RetryConfig::with_max_retries(self.max_retries)),
            versioning: self.versioning.for_client(client_id).clone(),
            ..RestClientConfig::default()
        };
        if let Some(user_agent) = &self.user_agent {
            rest.user_agent.clone_from(user_agent);
        }
        if self.allow_insecure_http {
            rest.transport = TransportSecurity::AllowInsecureHttp;
        }
        rest
    }
}
