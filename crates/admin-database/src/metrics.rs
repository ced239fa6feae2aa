// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::time::{Duration, Instant};

use opentelemetry::{
    metrics::{Counter, Histogram, Meter},
    Key, KeyValue,
};

const ERROR_KEY: Key = Key::from_static_str("error");
const POOL_KEY: Key = Key::from_static_str("pool");

const EXEC_TIME: &str = "sql.execution_time_seconds";
const POOL_CONNECTIONS: &str = "sql.dbpool_connections";
const POOL_CONNECTIONS_IDLE: &str = "sql.dbpool_connections_idle";
const ERRORS_TOTAL: &str = "sql.errors_total";

/// Database instruments, all attributed with the originating pool
#[derive(Debug)]
pub struct DatabaseMetrics {
    pub sql_execution_time: Histogram<f64>,
    pub sql_error: Counter<u64>,
    pub dbpool_connections: Histogram<u64>,
    pub dbpool_connections_idle: Histogram<u64>,
}

impl DatabaseMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            sql_execution_time: meter
                .f64_histogram(EXEC_TIME)
                .with_description("SQL execution time for a single diesel query")
                .with_unit("seconds")
                .build(),
            sql_error: meter
                .u64_counter(ERRORS_TOTAL)
                .with_description("Counter for total SQL query errors")
                .build(),
            dbpool_connections: meter
                .u64_histogram(POOL_CONNECTIONS)
                .with_description("Number of currently non-idling db connections")
                .build(),
            dbpool_connections_idle: meter
                .u64_histogram(POOL_CONNECTIONS_IDLE)
                .with_description("Number of currently idling db connections")
                .build(),
        }
    }

    pub(crate) fn record_execution_time(&self, pool: &'static str, elapsed: Duration) {
        self.sql_execution_time
            .record(elapsed.as_secs_f64(), &[KeyValue::new(POOL_KEY, pool)]);
    }

    pub(crate) fn record_error(&self, pool: &'static str, error: &diesel::result::Error) {
        self.sql_error.add(
            1,
            &[
                KeyValue::new(POOL_KEY, pool),
                KeyValue::new(ERROR_KEY, get_metrics_label_for_error(error)),
            ],
        );
    }

    pub(crate) fn record_pool_status(&self, pool: &'static str, size: u64, available: u64) {
        let labels = &[KeyValue::new(POOL_KEY, pool)];
        self.dbpool_connections.record(size, labels);
        self.dbpool_connections_idle.record(available, labels);
    }
}

pub(crate) fn get_metrics_label_for_error(error: &diesel::result::Error) -> &'static str {
    match error {
        diesel::result::Error::InvalidCString(_) => "invalid_c_string",
        diesel::result::Error::DatabaseError(e, _) => match e {
            diesel::result::DatabaseErrorKind::UniqueViolation => "unique_violation",
            diesel::result::DatabaseErrorKind::ForeignKeyViolation => "foreign_key_violation",
            diesel::result::DatabaseErrorKind::UnableToSendCommand => "unable_to_send_command",
            diesel::result::DatabaseErrorKind::SerializationFailure => "serialization_failure",
            _ => "unknown",
        },
        diesel::result::Error::NotFound => unreachable!(),
        diesel::result::Error::QueryBuilderError(_) => "query_builder_error",
        diesel::result::Error::DeserializationError(_) => "deserialization_error",
        diesel::result::Error::SerializationError(_) => "serialization_error",
        diesel::result::Error::RollbackTransaction => "rollback_transaction",
        diesel::result::Error::AlreadyInTransaction => "already_in_transaction",
        _ => "unknown",
    }
}

pin_project_lite::pin_project! {
    /// Future wrapper recording execution time and errors per pool
    pub struct Instrument<F> {
        pub(crate) metrics: Option<std::sync::Arc<DatabaseMetrics>>,
        pub(crate) pool: &'static str,
        #[pin]
        pub(crate) future: F,
        pub(crate) start: Option<Instant>,
    }
}
