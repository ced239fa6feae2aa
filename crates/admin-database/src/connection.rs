// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use core::{
    future::Future,
    pin::Pin,
    task::{ready, Poll},
};
use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use diesel::{
    connection::{Instrumentation, InstrumentationEvent},
    query_builder::{AsQuery, QueryFragment, QueryId},
    result::{ConnectionResult, QueryResult},
};
use diesel_async::{
    pooled_connection::deadpool::Object, AnsiTransactionManager, AsyncConnection, AsyncPgConnection,
    CacheSize, SimpleAsyncConnection, TransactionManager,
};
use futures_core::{future::BoxFuture, stream::BoxStream};

use crate::metrics::{DatabaseMetrics, Instrument};
use crate::{DatabaseError, RoutingTarget};

type Parent = Object<AsyncPgConnection>;

/// Pooled connection alias
pub type DbConnection = RoutedConnection<Parent>;

const DEFAULT_LEAK_THRESHOLD: Duration = Duration::from_secs(60);

/// A pooled connection tagged with the routing target it was drawn for
///
/// The tag is fixed at checkout time; a connection never migrates between
/// pools. Holding the connection longer than the pool's leak detection
/// threshold logs a warning on return.
pub struct RoutedConnection<Conn> {
    pub(crate) conn: Conn,
    pub(crate) target: RoutingTarget,
    pub(crate) metrics: Option<Arc<DatabaseMetrics>>,
    pub(crate) checked_out_at: Instant,
    pub(crate) leak_threshold: Duration,
    pub(crate) instrumentation: Arc<Mutex<Option<Box<dyn Instrumentation>>>>,
}

impl<Conn> std::fmt::Debug for RoutedConnection<Conn> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutedConnection")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl<Conn> RoutedConnection<Conn> {
    /// The pool this connection was drawn from
    pub fn target(&self) -> RoutingTarget {
        self.target
    }

    /// Guard for statements with write intent
    ///
    /// Issuing a write through a read-routed connection is a programmer
    /// error, not a recoverable condition.
    pub fn ensure_writable(&self) -> crate::Result<()> {
        match self.target {
            RoutingTarget::Write => Ok(()),
            RoutingTarget::Read => Err(DatabaseError::WriteOnReadRoute),
        }
    }
}

impl<Conn> Drop for RoutedConnection<Conn> {
    fn drop(&mut self) {
        let held_for = self.checked_out_at.elapsed();
        if held_for > self.leak_threshold {
            log::warn!(
                "{} connection was checked out for {held_for:?}, exceeding the leak detection threshold of {:?}",
                self.target,
                self.leak_threshold,
            );
        }
    }
}

impl<Conn> SimpleAsyncConnection for RoutedConnection<Conn>
where
    Conn: SimpleAsyncConnection + Send,
{
    async fn batch_execute(&mut self, query: &str) -> diesel::QueryResult<()> {
        Instrument {
            metrics: self.metrics.clone(),
            pool: self.target.label(),
            future: self.conn.batch_execute(query),
            start: None,
        }
        .await
    }
}

impl AsyncConnection for RoutedConnection<Parent> {
    type LoadFuture<'conn, 'query> =
        Instrument<BoxFuture<'query, QueryResult<Self::Stream<'conn, 'query>>>>;
    type ExecuteFuture<'conn, 'query> = Instrument<BoxFuture<'query, QueryResult<usize>>>;
    type Stream<'conn, 'query> = BoxStream<'static, QueryResult<Self::Row<'conn, 'query>>>;
    type Row<'conn, 'query> = <Parent as AsyncConnection>::Row<'conn, 'query>;
    type Backend = <Parent as AsyncConnection>::Backend;
    type TransactionManager = AnsiTransactionManager;

    async fn establish(database_url: &str) -> ConnectionResult<Self> {
        let mut instrumentation = diesel::connection::get_default_instrumentation();
        instrumentation.on_connection_event(InstrumentationEvent::start_establish_connection(
            database_url,
        ));

        Parent::establish(database_url).await.map(|conn| Self {
            conn,
            target: RoutingTarget::Write,
            metrics: None,
            checked_out_at: Instant::now(),
            leak_threshold: DEFAULT_LEAK_THRESHOLD,
            instrumentation: Arc::new(Mutex::new(instrumentation)),
        })
    }

    #[doc(hidden)]
    fn load<'conn, 'query, T>(&'conn mut self, source: T) -> Self::LoadFuture<'conn, 'query>
    where
        T: AsQuery + 'query,
        T::Query: QueryFragment<Self::Backend> + QueryId + 'query,
    {
        let query = source.as_query();
        log::trace!(
            "SQL Query:\n{}",
            diesel::debug_query::<Self::Backend, _>(&query)
        );

        Instrument {
            metrics: self.metrics.clone(),
            pool: self.target.label(),
            future: self.conn.load(query),
            start: None,
        }
    }

    fn execute_returning_count<'conn, 'query, T>(
        &'conn mut self,
        source: T,
    ) -> Self::ExecuteFuture<'conn, 'query>
    where
        T: QueryFragment<Self::Backend> + QueryId + 'query,
    {
        log::trace!(
            "SQL Query:\n{}",
            diesel::debug_query::<Self::Backend, _>(&source)
        );

        Instrument {
            metrics: self.metrics.clone(),
            pool: self.target.label(),
            future: self.conn.execute_returning_count(source),
            start: None,
        }
    }

    /// Get access to the current transaction state of this connection
    ///
    /// Hidden in `diesel` behind the
    /// `i-implement-a-third-party-backend-and-opt-into-breaking-changes` feature flag,
    /// therefore not generally visible in the `diesel` generated docs.
    fn transaction_state(
        &mut self,
    ) -> &mut <Self::TransactionManager as TransactionManager<Self>>::TransactionStateData {
        self.conn.transaction_state()
    }

    fn instrumentation(&mut self) -> &mut dyn Instrumentation {
        let Some(instrumentation) = Arc::get_mut(&mut self.instrumentation) else {
            panic!("Cannot access shared instrumentation")
        };

        instrumentation.get_mut().unwrap_or_else(|p| p.into_inner())
    }

    fn set_instrumentation(&mut self, instrumentation: impl Instrumentation) {
        self.instrumentation = Arc::new(Mutex::new(Some(Box::new(instrumentation))));
    }

    fn set_prepared_statement_cache_size(&mut self, size: CacheSize) {
        self.conn.set_prepared_statement_cache_size(size);
    }
}

impl<F, T> Future for Instrument<F>
where
    F: Future<Output = diesel::result::QueryResult<T>>,
{
    type Output = F::Output;

    fn poll(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        let this = self.project();

        if let Some(metrics) = &this.metrics {
            let start = this.start.get_or_insert_with(Instant::now);

            match ready!(this.future.poll(cx)) {
                res @ (Ok(_) | Err(diesel::result::Error::NotFound)) => {
                    metrics.record_execution_time(this.pool, start.elapsed());

                    Poll::Ready(res)
                }
                Err(e) => {
                    metrics.record_error(this.pool, &e);

                    Poll::Ready(Err(e))
                }
            }
        } else {
            this.future.poll(cx)
        }
    }
}
