// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use serde::{Deserialize, Serialize};

use super::{StandardErrorBody, ValidationErrorBody};

/// The body of an error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorBody {
    /// Special error body for validation errors
    Validation(ValidationErrorBody),
    /// The standard error body
    Standard(StandardErrorBody),
}

impl ErrorBody {
    /// The machine readable error code
    pub fn code(&self) -> &str {
        match self {
            Self::Validation(body) => &body.code,
            Self::Standard(body) => &body.code,
        }
    }

    /// The human readable message
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(body) => &body.message,
            Self::Standard(body) => &body.message,
        }
    }
}
