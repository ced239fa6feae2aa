// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Composed query plans
//!
//! A plan carries the data query, the matching count query and the named
//! bind parameters both share. Named placeholders (`:filter_email`) keep the
//! composed SQL readable and testable; [`ExecutionPlan::positional`]
//! rewrites them to `$n` placeholders right before execution, expanding list
//! binds and re-using indices for repeated names.

use rustc_hash::FxHashMap;

use crate::bind::BindValue;
use crate::error::SearchError;

/// A join emitted by the composer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// The relation path this join serves
    pub relation_path: String,
    /// The rendered join clause(s)
    pub sql: String,
    /// Whether the association is eagerly fetched
    pub fetch: bool,
    /// Whether a WHERE predicate relies on this join; such joins are kept
    /// in the count query
    pub required_for_filter: bool,
    /// Whether the joined association is collection valued
    pub collection: bool,
}

/// A parameterized data query with its matching count query
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub(crate) sql: String,
    pub(crate) count_sql: String,
    pub(crate) binds: Vec<(String, BindValue)>,
    pub(crate) joins: Vec<Join>,
}

impl ExecutionPlan {
    /// The composed data query with named placeholders
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The composed count query with named placeholders
    pub fn count_sql(&self) -> &str {
        &self.count_sql
    }

    /// The named bind parameters in assignment order
    pub fn binds(&self) -> &[(String, BindValue)] {
        &self.binds
    }

    /// The bind value assigned to `name`, if any
    pub fn bind(&self, name: &str) -> Option<&BindValue> {
        self.binds
            .iter()
            .find(|(bind_name, _)| bind_name == name)
            .map(|(_, value)| value)
    }

    /// The joins of the data query
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// The eagerly fetched joins
    pub fn fetch_joins(&self) -> impl Iterator<Item = &Join> {
        self.joins.iter().filter(|join| join.fetch)
    }

    /// Rewrite a query to positional `$n` placeholders
    ///
    /// Returns the rewritten SQL and the flat bind list in placeholder
    /// order. Repeated names map to the same placeholder; list binds expand
    /// into one placeholder per element.
    pub fn positional<'p>(&'p self, sql: &str) -> Result<(String, Vec<&'p BindValue>), SearchError> {
        let mut rewritten = String::with_capacity(sql.len());
        let mut flat: Vec<&BindValue> = Vec::new();
        let mut assigned: FxHashMap<&str, String> = FxHashMap::default();

        let mut rest = sql;

        while let Some(pos) = rest.find(':') {
            let (head, tail) = rest.split_at(pos);
            rewritten.push_str(head);

            // skip `::` casts
            if let Some(stripped) = tail.strip_prefix("::") {
                rewritten.push_str("::");
                rest = stripped;
                continue;
            }

            let name: &str = tail[1..]
                .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .next()
                .unwrap_or("");

            if name.is_empty() {
                rewritten.push(':');
                rest = &tail[1..];
                continue;
            }

            let placeholder = match assigned.get(name).cloned() {
                Some(placeholder) => placeholder,
                None => {
                    let (name_key, value) = self
                        .binds
                        .iter()
                        .find(|(bind_name, _)| bind_name == name)
                        .ok_or_else(|| SearchError::InvariantViolation {
                            message: format!("placeholder `:{name}` has no bind parameter"),
                        })?;

                    let placeholder = match value {
                        BindValue::List(values) => {
                            let mut slots = Vec::with_capacity(values.len());
                            for element in values {
                                flat.push(element);
                                slots.push(format!("${}", flat.len()));
                            }
                            slots.join(", ")
                        }
                        value => {
                            flat.push(value);
                            format!("${}", flat.len())
                        }
                    };

                    assigned.insert(name_key.as_str(), placeholder.clone());
                    placeholder
                }
            };

            rewritten.push_str(&placeholder);
            rest = &tail[1 + name.len()..];
        }

        rewritten.push_str(rest);
        Ok((rewritten, flat))
    }

    /// Check the plan's bind pairing invariant
    ///
    /// Every placeholder in the data query must have exactly one assigned
    /// bind and every bind must be referenced; the count query may only
    /// reference a subset (it has no pagination).
    pub(crate) fn validate_binds(&self) -> Result<(), SearchError> {
        let data_placeholders = placeholders(&self.sql);

        for (name, _) in &self.binds {
            if !data_placeholders.contains(name) {
                return Err(SearchError::InvariantViolation {
                    message: format!("bind parameter `{name}` is never referenced"),
                });
            }
        }

        for name in &data_placeholders {
            if self.bind(name).is_none() {
                return Err(SearchError::InvariantViolation {
                    message: format!("placeholder `:{name}` has no bind parameter"),
                });
            }
        }

        for name in placeholders(&self.count_sql) {
            if self.bind(&name).is_none() {
                return Err(SearchError::InvariantViolation {
                    message: format!("count placeholder `:{name}` has no bind parameter"),
                });
            }
        }

        Ok(())
    }
}

/// The named placeholders referenced by a query, in order of appearance
fn placeholders(sql: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = sql;

    while let Some(pos) = rest.find(':') {
        let tail = &rest[pos..];

        if let Some(stripped) = tail.strip_prefix("::") {
            rest = stripped;
            continue;
        }

        let name: &str = tail[1..]
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .next()
            .unwrap_or("");

        if name.is_empty() {
            rest = &tail[1..];
            continue;
        }

        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_owned());
        }

        rest = &tail[1 + name.len()..];
    }

    names
}
