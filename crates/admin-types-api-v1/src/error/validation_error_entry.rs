// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Sentinel replacing rejected values of secret-looking fields
pub const MASKED_VALUE: &str = "***";

/// Rejected values longer than this are truncated
const MAX_REJECTED_VALUE_LEN: usize = 100;

/// An entry in a validation error list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorEntry {
    /// The field related to the error
    ///
    /// If the value is [`None`] that means the error happened at struct level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<Cow<'static, str>>,

    /// The rejected input value, masked for secret-looking fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_value: Option<String>,

    /// Machine readable error code
    pub code: Cow<'static, str>,

    /// Human readable error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Cow<'static, str>>,
}

impl ValidationErrorEntry {
    /// Create a new validation error entry for a field with an optional message
    ///
    /// The rejected value is masked when the field name looks like it carries
    /// a secret, and truncated when longer than 100 characters.
    pub fn new<F, V, C, M>(field: F, rejected_value: V, code: C, message: Option<M>) -> Self
    where
        F: Into<Cow<'static, str>>,
        V: Into<String>,
        C: Into<Cow<'static, str>>,
        M: Into<Cow<'static, str>>,
    {
        let field = field.into();
        let rejected_value = sanitize_rejected_value(&field, rejected_value.into());

        Self {
            field: Some(field),
            rejected_value: Some(rejected_value),
            code: code.into(),
            message: message.map(Into::into),
        }
    }

    /// Create a new validation error entry for a top-level struct with an optional message
    pub fn new_struct_level<C, M>(code: C, message: Option<M>) -> Self
    where
        C: Into<Cow<'static, str>>,
        M: Into<Cow<'static, str>>,
    {
        Self {
            field: None,
            rejected_value: None,
            code: code.into(),
            message: message.map(Into::into),
        }
    }
}

fn sanitize_rejected_value(field: &str, value: String) -> String {
    if field_looks_secret(field) {
        return MASKED_VALUE.to_owned();
    }

    if value.chars().count() > MAX_REJECTED_VALUE_LEN {
        value.chars().take(MAX_REJECTED_VALUE_LEN).collect()
    } else {
        value
    }
}

fn field_looks_secret(field: &str) -> bool {
    let field = field.to_lowercase();

    ["password", "token", "secret", "key"]
        .iter()
        .any(|marker| field.contains(marker))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn secret_fields_are_masked() {
        for field in ["password", "apiToken", "clientSecret", "ACCESS_KEY"] {
            let entry = ValidationErrorEntry::new(
                field.to_owned(),
                "hunter2",
                "invalid_value",
                Some("must not be empty"),
            );
            assert_eq!(entry.rejected_value.as_deref(), Some(MASKED_VALUE));
        }
    }

    #[test]
    fn long_values_are_truncated() {
        let entry = ValidationErrorEntry::new(
            "displayName",
            "x".repeat(250),
            "invalid_length",
            None::<&str>,
        );
        assert_eq!(entry.rejected_value.as_deref(), Some("x".repeat(100).as_str()));
    }

    #[test]
    fn plain_values_pass_through() {
        let entry =
            ValidationErrorEntry::new("email", "not-an-email", "invalid_email", None::<&str>);
        assert_eq!(entry.rejected_value.as_deref(), Some("not-an-email"));
    }
}
