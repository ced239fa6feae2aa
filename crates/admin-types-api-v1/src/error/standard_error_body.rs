// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Standard API error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardErrorBody {
    /// Machine readable error code
    pub code: Cow<'static, str>,

    /// Human readable message
    pub message: Cow<'static, str>,
}
