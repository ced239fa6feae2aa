// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::ValidationErrorEntry;

/// The body of a validation error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorBody {
    /// Machine readable error code
    pub code: Cow<'static, str>,

    /// Human readable message
    pub message: Cow<'static, str>,

    /// A list of validation errors
    pub validation_errors: Vec<ValidationErrorEntry>,
}

impl ValidationErrorBody {
    /// Create a new validation error body with a message and a list of error entries
    pub fn new<C, M>(code: C, message: M, validation_errors: Vec<ValidationErrorEntry>) -> Self
    where
        C: Into<Cow<'static, str>>,
        M: Into<Cow<'static, str>>,
    {
        Self {
            code: code.into(),
            message: message.into(),
            validation_errors,
        }
    }
}
