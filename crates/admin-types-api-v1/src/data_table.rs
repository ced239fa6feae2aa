// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Data-table request envelope
//!
//! The request body accepted by every searchable list endpoint. Column names
//! refer to the client-facing names declared by the entity's search
//! descriptor; filters follow the `operator[:value[,value...]]` grammar.

use serde::{Deserialize, Serialize};

use crate::Pagination;

/// Sorting direction for a single column
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Global search over the entity's default or explicitly listed columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    /// Text searched across the effective search column set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,

    /// Explicit column list overriding the descriptor's default search columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

/// A single column of a data-table request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    /// Client-facing column name, resolved through the descriptor's aliases
    pub column_name: String,

    /// Column filter in the `operator[:value[,value...]]` grammar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Requested sorting for this column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortDirection>,
}

impl TableColumn {
    /// A plain column reference without filter or sort
    pub fn named<N: Into<String>>(column_name: N) -> Self {
        Self {
            column_name: column_name.into(),
            filter: None,
            sort: None,
        }
    }
}

/// The request body of a data-table search call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTableRequest {
    #[serde(default)]
    pub pagination: Pagination,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_filter: Option<SearchFilter>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<TableColumn>,
}

impl DataTableRequest {
    /// The global search text, if a non-empty one was provided
    pub fn search_text(&self) -> Option<&str> {
        self.search_filter
            .as_ref()
            .and_then(|filter| filter.search_text.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// The explicit global search column list, if a non-empty one was provided
    pub fn search_columns(&self) -> Option<&[String]> {
        self.search_filter
            .as_ref()
            .and_then(|filter| filter.columns.as_deref())
            .filter(|columns| !columns.is_empty())
    }
}
