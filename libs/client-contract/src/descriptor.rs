//! Static descriptions of HTTP client contracts.
//!
//! A [`ClientDescriptor`] plays the role an annotated interface plays in
//! reflective frameworks: it names the base path, the default API version and
//! every operation with its method, path template, optional version and
//! calling convention. Descriptors are plain `'static` data declared once per
//! contract and handed to [`ClientInvoker`](crate::ClientInvoker).

use crate::error::{DescriptorError, TemplateError};
use crate::template::PathTemplate;
use rest_client::ApiVersion;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// How an operation hands its result to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMode {
    /// The caller's thread waits for the value
    Blocking,
    /// The caller receives a single-value future
    Deferred,
}

impl fmt::Display for ReturnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Blocking => "blocking",
            Self::Deferred => "deferred",
        })
    }
}

/// One endpoint of a client contract
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub method: http::Method,
    /// Template relative to the client's base path, e.g. `/greeting/{name}`
    pub path: &'static str,
    /// Explicit version tag; `None` inherits the client default
    pub version: Option<&'static str>,
    pub return_mode: ReturnMode,
}

/// A named client contract and its operations
#[derive(Debug)]
pub struct ClientDescriptor {
    /// Identifier used to look up per-client settings
    pub id: &'static str,
    pub base_path: &'static str,
    pub default_version: Option<&'static str>,
    pub operations: &'static [OperationDescriptor],
}

impl ClientDescriptor {
    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// The operation's own tag if it has one, otherwise the client default
    #[must_use]
    pub fn effective_version(&self, op: &OperationDescriptor) -> Option<&'static str> {
        op.version.or(self.default_version)
    }

    /// Base path and operation path joined with exactly one `/`
    ///
    /// # Errors
    /// Returns `TemplateError` if the joined path is not a valid template.
    pub fn path_template(&self, op: &OperationDescriptor) -> Result<PathTemplate, TemplateError> {
        let base = self.base_path.trim_end_matches('/');
        let path = op.path.trim_start_matches('/');
        let joined = match (base.is_empty(), path.is_empty()) {
            (_, true) if base.is_empty() => "/".to_owned(),
            (_, true) => base.to_owned(),
            (true, false) => format!("/{path}"),
            (false, false) => format!("{base}/{path}"),
        };
        PathTemplate::parse(&joined)
    }

    /// Check operation names are unique, paths parse and version labels are valid.
    ///
    /// # Errors
    /// Returns the first `DescriptorError` found.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if let Some(default) = self.default_version {
            ApiVersion::new(default).map_err(|source| DescriptorError::Version {
                operation: "<default>",
                source,
            })?;
        }

        let mut names = HashSet::new();
        for op in self.operations {
            if !names.insert(op.name) {
                return Err(DescriptorError::DuplicateOperation {
                    client: self.id,
                    operation: op.name,
                });
            }
            self.path_template(op)
                .map_err(|source| DescriptorError::Template {
                    operation: op.name,
                    source,
                })?;
            if let Some(version) = op.version {
                ApiVersion::new(version).map_err(|source| DescriptorError::Version {
                    operation: op.name,
                    source,
                })?;
            }
        }
        Ok(())
    }
}
