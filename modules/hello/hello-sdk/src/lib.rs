#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Hello SDK
//!
//! Client side of the remote hello service:
//! - [`HelloClient`] trait with a blocking version-1 greeting and a deferred
//!   version-2 greeting
//! - [`HELLO_CLIENT`] static description of both operations
//! - [`HttpHelloClient`] implementation over the generic invoker
//! - [`HelloClientConfig`] layered configuration
//!
//! ## Usage
//!
//! ```ignore
//! use hello_sdk::{HelloClient, HelloClientConfig, HttpHelloClient};
//!
//! let config = HelloClientConfig::load(Some(Path::new("hello.yaml")))?;
//! let client = HttpHelloClient::new(&config)?;
//!
//! let v1 = client.say_hello("Fred")?;
//! let v2 = client.say_hello_two("Fred").await?;
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod descriptor;
pub mod error;

pub use api::HelloClient;
pub use client::HttpHelloClient;
pub use client_contract::Deferred;
pub use config::{ENV_PREFIX, HelloClientConfig, VersioningSettings};
pub use descriptor::{HELLO_CLIENT, SAY_HELLO, SAY_HELLO_TWO, descriptor};
pub use error::{ConfigError, HelloError};
