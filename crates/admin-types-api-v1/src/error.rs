// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Error response types for REST APIv1

mod api_error;
mod envelope;
mod error_body;
mod standard_error_body;
mod validation_error_body;
mod validation_error_entry;

pub use api_error::ApiError;
pub use envelope::ErrorEnvelope;
pub use error_body::ErrorBody;
pub use standard_error_body::StandardErrorBody;
pub use validation_error_body::ValidationErrorBody;
pub use validation_error_entry::ValidationErrorEntry;

use http::StatusCode;

/// Error code for a field unknown to the entity's search descriptor
pub const ERROR_CODE_UNKNOWN_FIELD: &str = "unknown_field";

/// Error code for a sort request on a field that is not sortable
pub const ERROR_CODE_NOT_SORTABLE: &str = "not_sortable";

/// Error code for a malformed filter expression
pub const ERROR_CODE_INVALID_FILTER: &str = "invalid_filter";

/// Error code when a required value is missing
pub const ERROR_CODE_VALUE_REQUIRED: &str = "value_required";

/// Error code when an invalid value is encountered
pub const ERROR_CODE_INVALID_VALUE: &str = "invalid_value";

/// The error taxonomy of the admin service
///
/// Every outbound error maps to exactly one kind; the kind determines the
/// stable error code and the HTTP status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Bad field reference, unknown sort target, malformed filter grammar
    ValidationFailed,
    /// Value-level constraint breach
    ConstraintViolation,
    /// Authentication failure
    Unauthorized,
    /// Authorization failure
    Forbidden,
    /// Addressable resource missing
    NotFound,
    /// Unique or foreign-key violation
    Conflict,
    /// Framework misuse, e.g. a mid-transaction route change
    InvariantViolation,
    /// Pool exhaustion or external service failure, retryable
    InfrastructureUnavailable,
    /// Uncaught or unexpected failure
    Internal,
}

impl ErrorKind {
    /// The HTTP status this kind maps to
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ValidationFailed | Self::ConstraintViolation => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::InvariantViolation | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InfrastructureUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// The stable machine readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailed => "validation_failed",
            Self::ConstraintViolation => "constraint_violation",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InvariantViolation => "invariant_violation",
            Self::InfrastructureUnavailable => "infrastructure_unavailable",
            Self::Internal => "internal",
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn kind_codes_are_stable() {
        assert_eq!(ErrorKind::ValidationFailed.code(), "validation_failed");
        assert_eq!(ErrorKind::ValidationFailed.to_string(), "validation_failed");
        assert_eq!(
            ErrorKind::InfrastructureUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorKind::InvariantViolation.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
