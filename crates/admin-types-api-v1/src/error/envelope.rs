// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ApiError, ValidationErrorEntry};
use crate::TraceId;

/// The outbound error envelope
///
/// Everything an API consumer gets to see about a failed request: the stable
/// error code, a user-facing message, where and when it happened, and the
/// trace id to correlate with server logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Always `false`
    pub success: bool,

    pub error_code: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,

    pub trace_id: TraceId,

    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<Vec<ValidationErrorEntry>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl ErrorEnvelope {
    /// Assemble the envelope for an error raised while serving `path`
    pub fn new(error: &ApiError, trace_id: TraceId) -> Self {
        let validation_errors = match error.validation_errors() {
            [] => None,
            errors => Some(errors.to_vec()),
        };

        Self {
            success: false,
            error_code: error.body().code().to_owned(),
            message: error.body().message().to_owned(),
            path: None,
            method: None,
            client_ip: None,
            trace_id,
            timestamp: Utc::now(),
            validation_errors,
            metadata: None,
        }
    }

    pub fn with_request<P, M>(mut self, method: M, path: P, client_ip: Option<String>) -> Self
    where
        P: Into<String>,
        M: Into<String>,
    {
        self.path = Some(path.into());
        self.method = Some(method.into());
        self.client_ip = client_ip;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
