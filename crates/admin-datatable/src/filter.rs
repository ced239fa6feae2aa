// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Column filter grammar
//!
//! A filter string has the form `operator[:value[,value...]]`, e.g.
//! `cnt:acme`, `dbetween:2024-01-01,2024-06-30` or `notnull`. Operators are
//! matched case-insensitively; the canonical rendering is lowercase.

use std::fmt;
use std::str::FromStr;

/// The filter operator set
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FilterOperator {
    /// Case-insensitive substring match
    Cnt,
    /// Negated case-insensitive substring match
    Ncnt,
    /// Case-insensitive prefix match
    Sw,
    /// Case-insensitive suffix match
    Ew,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Date-only equality
    Deq,
    /// Date-only inequality
    Dne,
    Dgt,
    Dgte,
    Dlt,
    Dlte,
    /// Inclusive date range, expects exactly two values
    Dbetween,
    In,
    Notnull,
    Isnull,
}

impl FilterOperator {
    /// Operators comparing the date part only
    pub fn is_date_operator(&self) -> bool {
        matches!(
            self,
            Self::Deq | Self::Dne | Self::Dgt | Self::Dgte | Self::Dlt | Self::Dlte | Self::Dbetween
        )
    }

    /// Operators that take no value
    pub fn is_nullary(&self) -> bool {
        matches!(self, Self::Notnull | Self::Isnull)
    }
}

/// The parsed form of one column filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCriteria {
    pub operator: FilterOperator,
    /// The raw, comma-separated values; empty for nullary operators
    pub values: Vec<String>,
}

impl FilterCriteria {
    /// The single filter value, for operators taking exactly one
    pub fn single_value(&self) -> Option<&str> {
        match self.values.as_slice() {
            [value] => Some(value),
            _ => None,
        }
    }
}

/// Failure to parse a filter string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterParseError {
    #[error("empty filter expression")]
    Empty,

    #[error("unknown filter operator `{operator}`")]
    UnknownOperator { operator: String },
}

impl FromStr for FilterCriteria {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(FilterParseError::Empty);
        }

        let (operator, values) = match s.split_once(':') {
            Some((operator, rest)) => (
                operator,
                rest.split(',').map(str::to_owned).collect::<Vec<_>>(),
            ),
            None => (s, Vec::new()),
        };

        let operator =
            FilterOperator::from_str(operator).map_err(|_| FilterParseError::UnknownOperator {
                operator: operator.to_owned(),
            })?;

        Ok(Self { operator, values })
    }
}

impl fmt::Display for FilterCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.values.is_empty() {
            write!(f, "{}", self.operator)
        } else {
            write!(f, "{}:{}", self.operator, self.values.join(","))
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_operator_and_values() {
        let criteria: FilterCriteria = "cnt:acme".parse().unwrap();
        assert_eq!(criteria.operator, FilterOperator::Cnt);
        assert_eq!(criteria.values, vec!["acme"]);

        let criteria: FilterCriteria = "dbetween:2024-01-01,2024-06-30".parse().unwrap();
        assert_eq!(criteria.operator, FilterOperator::Dbetween);
        assert_eq!(criteria.values, vec!["2024-01-01", "2024-06-30"]);

        let criteria: FilterCriteria = "notnull".parse().unwrap();
        assert_eq!(criteria.operator, FilterOperator::Notnull);
        assert!(criteria.values.is_empty());
    }

    #[test]
    fn operator_case_is_insensitive() {
        let criteria: FilterCriteria = "CNT:Acme".parse().unwrap();
        assert_eq!(criteria.operator, FilterOperator::Cnt);
        // value case is preserved
        assert_eq!(criteria.values, vec!["Acme"]);
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert_eq!(
            "like:foo".parse::<FilterCriteria>(),
            Err(FilterParseError::UnknownOperator {
                operator: "like".to_owned()
            })
        );
        assert_eq!("".parse::<FilterCriteria>(), Err(FilterParseError::Empty));
    }

    #[test]
    fn round_trip() {
        for filter in [
            "cnt:acme",
            "ncnt:acme",
            "sw:ac",
            "ew:me",
            "eq:1",
            "ne:0",
            "gt:10",
            "gte:10",
            "lt:10",
            "lte:10",
            "deq:2024-01-01",
            "dne:2024-01-01",
            "dgt:2024-01-01",
            "dgte:2024-01-01",
            "dlt:2024-01-01",
            "dlte:2024-01-01",
            "dbetween:2024-01-01,2024-06-30",
            "in:a,b,c",
            "notnull",
            "isnull",
            "eq:",
        ] {
            let parsed: FilterCriteria = filter.parse().unwrap();
            assert_eq!(parsed.to_string(), filter);
        }
    }
}
