//! HTTP error mapping (spec §6's status table, §7's taxonomy).
//!
//! `ErrorKind` stays deliberately closed in `nebula-error`; this module maps
//! it onto HTTP status with one twist. `ErrorKind::NotFound` covers two
//! different spec concepts: a plain "no such entity" lookup (404) and a
//! missing prerequisite -- no signing CA, no IP pool, no compatible CA
//! bundle (503). The two are indistinguishable by kind alone, so the
//! handful of call sites that hit a genuine prerequisite lookup
//! (`CertManager::issue_or_rotate`'s CA lookups, `IpAllocator::allocate`'s
//! pool-exhaustion case, `filter_ca_bundle`'s empty-bundle case) wrap the
//! error with [`ApiError::prerequisite`] before it reaches the response;
//! every other `NotFound` falls through the default [`status_for`] mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nebula_error::{ErrorKind, NebulaError};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

/// An error on its way out of a handler, already carrying the HTTP status
/// it should produce.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    /// Build directly from a status and message, for handler-local checks
    /// that never pass through [`NebulaError`] (malformed path params,
    /// missing headers).
    #[must_use]
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self { status, detail: detail.into() }
    }

    /// Override a [`NebulaError`] known to mean "prerequisite missing" at
    /// this specific call site, regardless of the default mapping for its
    /// kind.
    #[must_use]
    pub fn prerequisite(err: NebulaError) -> Self {
        Self { status: StatusCode::SERVICE_UNAVAILABLE, detail: err.to_string() }
    }

    /// The status this error will respond with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<NebulaError> for ApiError {
    fn from(err: NebulaError) -> Self {
        let status = status_for(err.kind());
        tracing::warn!(kind = %err.kind(), status = %status, "request rejected");
        Self { status, detail: err.to_string() }
    }
}

/// The default `ErrorKind` -> HTTP status mapping (spec §6's table).
///
/// `NotFound` defaults to 404; handlers on a prerequisite-lookup path
/// override via [`ApiError::prerequisite`] instead of relying on this
/// function.
#[must_use]
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::External | ErrorKind::Io | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

/// Convenience alias used by every handler signature in this crate.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn not_found_defaults_to_404() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn prerequisite_override_forces_503_regardless_of_kind() {
        let err = ApiError::prerequisite(NebulaError::not_found("signing CA", "v2"));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn conflict_maps_to_409() {
        let err: ApiError = NebulaError::conflict("ip already assigned").into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn validation_maps_to_400() {
        let err: ApiError = NebulaError::validation("bad cidr").into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
