#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Declarative HTTP client contracts.
//!
//! A contract is a static [`ClientDescriptor`]: base path, default API
//! version, and a table of [`OperationDescriptor`]s. [`ClientInvoker`]
//! resolves an operation against that table (path expansion, effective
//! version) and executes it over a [`rest_client::RestClient`], either
//! blocking the caller or returning a [`Deferred`] result.

mod descriptor;
mod error;
mod invoker;
mod runtime;
mod template;

pub use descriptor::{ClientDescriptor, OperationDescriptor, ReturnMode};
pub use error::{DescriptorError, InvokeError, TemplateError};
pub use invoker::{ClientInvoker, ResolvedCall};
pub use runtime::{ClientRuntime, Deferred};
pub use template::PathTemplate;
