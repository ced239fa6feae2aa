// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Pagination types

use serde::{de, Deserialize, Deserializer, Serialize};

/// Largest allowed page size
pub const MAX_PAGE_SIZE: i64 = 100;

/// Page-based pagination, zero-indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// The number of the page, starting at 0
    #[serde(default, deserialize_with = "deserialize_page")]
    pub page: i64,

    /// The number of entries per page
    #[serde(default = "default_size", deserialize_with = "deserialize_size")]
    pub size: i64,
}

impl Pagination {
    /// The row offset addressed by this pagination
    pub fn offset(&self) -> i64 {
        self.page * self.size
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 0,
            size: default_size(),
        }
    }
}

/// Enforce the page setting to be >=0
fn deserialize_page<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let page = i64::deserialize(deserializer)?;
    if page >= 0 {
        Ok(page)
    } else {
        Err(de::Error::custom("page must not be negative"))
    }
}

/// Enforce the size setting to be <=100 and >0
fn deserialize_size<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let size = i64::deserialize(deserializer)?;
    if size <= MAX_PAGE_SIZE && size > 0 {
        Ok(size)
    } else if size <= 0 {
        Err(de::Error::custom("size <= 0"))
    } else {
        Err(de::Error::custom("size too large"))
    }
}

const fn default_size() -> i64 {
    50
}
