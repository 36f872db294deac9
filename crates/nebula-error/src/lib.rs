//! Centralized error type for the Nebula fleet control plane.
//!
//! Every fallible operation in this workspace returns [`Result<T>`], built on
//! a single [`NebulaError`] with a closed [`ErrorKind`]. Conversion to an
//! HTTP status happens once, at the `nebula-api` boundary -- internal crates
//! never think in terms of status codes, only in terms of kind and
//! retryability.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used throughout the workspace.
pub type Result<T> = std::result::Result<T, NebulaError>;

/// The closed set of ways an operation in this system can fail.
///
/// Kept deliberately small: every crate maps its internal failures onto one
/// of these eight buckets rather than inventing crate-local error enums that
/// the API layer would have to special-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Caller-supplied data failed validation (malformed CIDR, bad token
    /// format, missing required field).
    Validation,
    /// The referenced entity does not exist.
    NotFound,
    /// The requested state change conflicts with the entity's current state
    /// (double allocation, re-using a revoked token, re-registering a node).
    Conflict,
    /// The caller has no valid credentials at all.
    Unauthenticated,
    /// The caller is known but lacks permission for this operation.
    Unauthorized,
    /// An external collaborator (the `nebula-cert` binary, the GitHub API,
    /// the Nebula process) failed or returned something unexpected.
    External,
    /// A filesystem or network I/O operation failed.
    Io,
    /// Anything else -- a bug, an invariant violation, a poisoned lock.
    Internal,
}

impl ErrorKind {
    /// Whether a caller may reasonably retry the operation unchanged.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::External | Self::Io)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Unauthenticated => "unauthenticated",
            Self::Unauthorized => "unauthorized",
            Self::External => "external",
            Self::Io => "io",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// The error type returned by every fallible operation in this workspace.
#[derive(Debug, Error, Clone)]
#[error("{kind}: {message}")]
pub struct NebulaError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<std::sync::Arc<dyn std::error::Error + Send + Sync>>,
}

impl NebulaError {
    /// Build a new error of the given kind with a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), source: None }
    }

    /// Attach a source error, for `tracing::error!(error = %err)` chains.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(std::sync::Arc::new(source));
        self
    }

    /// Shorthand for [`ErrorKind::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Shorthand for [`ErrorKind::NotFound`].
    pub fn not_found(entity: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, format!("{entity} not found: {id}"))
    }

    /// Shorthand for [`ErrorKind::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Shorthand for [`ErrorKind::Unauthenticated`].
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    /// Shorthand for [`ErrorKind::Unauthorized`].
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    /// Shorthand for [`ErrorKind::External`].
    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::External, message)
    }

    /// Shorthand for [`ErrorKind::Io`].
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    /// Shorthand for [`ErrorKind::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// The error's kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Whether a caller may reasonably retry the operation unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<std::io::Error> for NebulaError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for NebulaError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation(err.to_string()).with_source(err)
    }
}

impl From<serde_yaml::Error> for NebulaError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::validation(err.to_string()).with_source(err)
    }
}

impl From<uuid::Error> for NebulaError {
    fn from(err: uuid::Error) -> Self {
        Self::validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = NebulaError::not_found("Node", "abc-123");
        assert_eq!(err.to_string(), "not_found: Node not found: abc-123");
    }

    #[test]
    fn external_and_io_are_retryable() {
        assert!(ErrorKind::External.is_retryable());
        assert!(ErrorKind::Io.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Conflict.is_retryable());
    }

    #[test]
    fn io_error_conversion_sets_io_kind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: NebulaError = io_err.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
