// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::dates;
use crate::field_type::FieldType;

/// A typed bind parameter of a composed query
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Int(i32),
    Long(i64),
    Decimal(BigDecimal),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    /// Expanded into one placeholder per element for `IN` predicates
    List(Vec<BindValue>),
}

/// A filter value that does not coerce into its field's declared type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("value `{value}` does not coerce to {field_type}")]
pub struct CoerceError {
    pub value: String,
    pub field_type: FieldType,
}

impl BindValue {
    /// Coerce a raw filter value into the field's declared type
    pub fn coerce(value: &str, field_type: FieldType) -> Result<Self, CoerceError> {
        let err = || CoerceError {
            value: value.to_owned(),
            field_type,
        };

        let value = value.trim();

        match field_type {
            FieldType::Text | FieldType::Enum => Ok(Self::Text(value.to_owned())),
            FieldType::Int => value.parse().map(Self::Int).map_err(|_| err()),
            FieldType::Long => value.parse().map(Self::Long).map_err(|_| err()),
            FieldType::Decimal => value.parse().map(Self::Decimal).map_err(|_| err()),
            FieldType::Bool => parse_bool(value).map(Self::Bool).ok_or_else(err),
            FieldType::BoolAsInt => parse_bool(value)
                .map(|flag| Self::Int(i32::from(flag)))
                .ok_or_else(err),
            FieldType::Date => dates::parse_date(value).map(Self::Date).ok_or_else(err),
            FieldType::Timestamp => dates::parse_date_time(value)
                .map(|date_time| Self::Timestamp(date_time.and_utc()))
                .ok_or_else(err),
            FieldType::Uuid => Uuid::parse_str(value).map(Self::Uuid).map_err(|_| err()),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => match value.to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
    }
}
