// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use serde::{Deserialize, Serialize};

/// One page of a paginated collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// The zero-indexed page number
    pub page: i64,

    /// The requested page size
    pub size: i64,

    /// Total number of elements across all pages
    pub total_elements: i64,

    /// Total number of pages for the requested size
    pub total_pages: i64,

    /// Whether this is the last page
    pub last: bool,

    /// The elements of this page
    pub content: Vec<T>,
}

impl<T> Page<T> {
    /// Assemble a page from its content and the total element count
    ///
    /// An empty result yields `total_pages = 0` and `last = true`.
    pub fn new(page: i64, size: i64, total_elements: i64, content: Vec<T>) -> Self {
        let total_pages = if total_elements == 0 {
            0
        } else {
            (total_elements + size - 1) / size
        };

        Self {
            page,
            size,
            total_elements,
            total_pages,
            last: page >= total_pages - 1,
            content,
        }
    }

    /// Map the page content, keeping the page metadata
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            last: self.last,
            content: self.content.into_iter().map(f).collect(),
        }
    }
}
