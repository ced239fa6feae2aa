// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Filter date parsing
//!
//! Client filters carry dates in a handful of formats. Parsing is attempted
//! in a fixed order and successful results are memoized in a bounded,
//! process-wide cache. The cache is cleared wholesale when it reaches its
//! capacity, so a miss is only ever a performance concern, never a
//! correctness one.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

const DATE_CACHE_CAPACITY: usize = 1_000;

static DATE_CACHE: LazyLock<Mutex<FxHashMap<String, NaiveDateTime>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

/// Formats attempted in order for datetime inputs
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Formats attempted in order for date-only inputs
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Parse a filter date value, with or without a time component
///
/// Returns [`None`] for unparseable input; the caller downgrades the
/// affected predicate with a warning instead of failing the request.
pub fn parse_date_time(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Some(cached) = DATE_CACHE.lock().get(input) {
        return Some(*cached);
    }

    let parsed = parse_uncached(input)?;

    let mut cache = DATE_CACHE.lock();
    if cache.len() >= DATE_CACHE_CAPACITY {
        cache.clear();
    }
    cache.insert(input.to_owned(), parsed);

    Some(parsed)
}

/// Parse a filter date value, normalizing any time component away
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    parse_date_time(input).map(|date_time| date_time.date())
}

fn parse_uncached(input: &str) -> Option<NaiveDateTime> {
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    for format in DATE_TIME_FORMATS {
        if let Ok(date_time) = NaiveDateTime::parse_from_str(input, format) {
            return Some(date_time);
        }
    }

    None
}

#[cfg(test)]
pub(crate) fn cache_len() -> usize {
    DATE_CACHE.lock().len()
}
