// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Database connector, read/write routing and connection handling
//!
//! Every repository call flows through the routing datasource in this crate:
//! a [`Db`] owns one connection pool per [`RoutingTarget`] and hands out
//! connections according to the routing tag in effect for the current task.
//! The tag is request scoped; [`with_read`] and [`with_write`] set it at the
//! service boundary and restore the previous value on every exit path.

use diesel_async::pooled_connection::deadpool::{BuildError, PoolError};
use snafu::Snafu;

mod connection;
mod db;
mod metrics;
mod routing;

pub use connection::DbConnection;
pub use db::Db;
pub use metrics::DatabaseMetrics;
pub use routing::{current_target, with_read, with_routing, with_write, RoutingTarget};

/// Result type using [`DatabaseError`] as a default Error
pub type Result<T, E = DatabaseError> = std::result::Result<T, E>;

/// Error types for the database abstraction
#[derive(Debug, Snafu)]
pub enum DatabaseError {
    #[snafu(display("Database Error: `{message}`",))]
    Custom { message: String },

    #[snafu(display("Diesel Error: `{source}`",))]
    DieselError { source: diesel::result::Error },

    #[snafu(display("A requested resource could not be found"))]
    NotFound,

    #[snafu(display("Deadpool build error: `{source}`",), context(false))]
    DeadpoolBuildError { source: BuildError },

    #[snafu(display("Deadpool error: `{source}`",))]
    DeadpoolError { source: PoolError },

    #[snafu(display(
        "Routing target {requested} requested while a {active} transaction is open"
    ))]
    RoutingChangedMidTransaction {
        active: RoutingTarget,
        requested: RoutingTarget,
    },

    #[snafu(display("Write statement attempted on a read-routed connection"))]
    WriteOnReadRoute,
}

impl DatabaseError {
    /// Returns `true` if the database error is [`NotFound`].
    ///
    /// [`NotFound`]: DatabaseError::NotFound
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns `true` for errors that indicate misuse of the routing
    /// datasource rather than a query or infrastructure problem.
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::RoutingChangedMidTransaction { .. } | Self::WriteOnReadRoute
        )
    }

    /// Returns `true` for errors callers may retry, i.e. pool exhaustion
    /// or connection establishment failures.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeadpoolError { .. })
    }
}

impl From<diesel::result::Error> for DatabaseError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => Self::NotFound,
            source => Self::DieselError { source },
        }
    }
}

pub trait OptionalExt<T, E> {
    fn optional(self) -> Result<Option<T>, E>;
}

impl<T> OptionalExt<T, DatabaseError> for Result<T, DatabaseError> {
    fn optional(self) -> Result<Option<T>, DatabaseError> {
        match self {
            Ok(t) => Ok(Some(t)),
            Err(DatabaseError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
