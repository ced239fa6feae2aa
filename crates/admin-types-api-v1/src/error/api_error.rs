// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::borrow::Cow;
use std::fmt;

use http::StatusCode;

use super::{ErrorBody, StandardErrorBody, ValidationErrorBody, ValidationErrorEntry};
use crate::error::ErrorKind;

/// A REST APIv1 error
///
/// Pairs an HTTP status with the serializable error body. Usually built from
/// an [`ErrorKind`] and refined with the builder methods:
///
/// ```
/// use opentalk_admin_types_api_v1::error::{ApiError, ErrorKind};
///
/// let error = ApiError::from_kind(ErrorKind::NotFound).with_message("user not found");
/// assert_eq!(error.status().as_u16(), 404);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    /// Create an error from a taxonomy kind with the kind's default code and message
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            status: kind.status(),
            body: ErrorBody::Standard(StandardErrorBody {
                code: Cow::Borrowed(kind.code()),
                message: Cow::Borrowed(default_message(kind)),
            }),
        }
    }

    /// Create a validation error carrying per-field entries
    pub fn validation<M>(message: M, errors: Vec<ValidationErrorEntry>) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        let kind = ErrorKind::ValidationFailed;

        Self {
            status: kind.status(),
            body: ErrorBody::Validation(ValidationErrorBody::new(kind.code(), message, errors)),
        }
    }

    /// Replace the machine readable error code
    pub fn with_code<C>(mut self, code: C) -> Self
    where
        C: Into<Cow<'static, str>>,
    {
        match &mut self.body {
            ErrorBody::Standard(body) => body.code = code.into(),
            ErrorBody::Validation(body) => body.code = code.into(),
        }
        self
    }

    /// Replace the human readable message
    pub fn with_message<M>(mut self, message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        match &mut self.body {
            ErrorBody::Standard(body) => body.message = message.into(),
            ErrorBody::Validation(body) => body.message = message.into(),
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }

    /// The validation error entries, empty for standard errors
    pub fn validation_errors(&self) -> &[ValidationErrorEntry] {
        match &self.body {
            ErrorBody::Validation(body) => &body.validation_errors,
            ErrorBody::Standard(_) => &[],
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.status,
            self.body.code(),
            self.body.message()
        )
    }
}

impl std::error::Error for ApiError {}

impl From<ErrorKind> for ApiError {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

fn default_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ValidationFailed => "The request contains invalid fields",
        ErrorKind::ConstraintViolation => "A value constraint was violated",
        ErrorKind::Unauthorized => "Authentication is required",
        ErrorKind::Forbidden => "Access to this resource is denied",
        ErrorKind::NotFound => "The requested resource could not be found",
        ErrorKind::Conflict => "The request conflicts with existing data",
        ErrorKind::InvariantViolation => "An internal invariant was violated",
        ErrorKind::InfrastructureUnavailable => "A required service is temporarily unavailable",
        ErrorKind::Internal => "An internal server error occurred",
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn builder_refinement() {
        let error = ApiError::from_kind(ErrorKind::ValidationFailed)
            .with_code("unknown_field")
            .with_message("unknown column `role.name`");

        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.body().code(), "unknown_field");
        assert_eq!(error.body().message(), "unknown column `role.name`");
    }

    #[test]
    fn validation_body_round_trip() {
        let error = ApiError::validation(
            "2 fields failed validation",
            vec![
                ValidationErrorEntry::new("email", "nope", "invalid_email", Some("not an email")),
                ValidationErrorEntry::new("password", "hunter2", "invalid_length", None::<&str>),
            ],
        );

        let json = serde_json::to_value(error.body()).unwrap();
        assert_eq!(json["validationErrors"][1]["rejectedValue"], "***");

        let body: ErrorBody = serde_json::from_value(json).unwrap();
        assert_eq!(&body, error.body());
    }
}
