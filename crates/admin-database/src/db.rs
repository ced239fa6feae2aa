// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use deadpool_runtime::Runtime;
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager, ManagerConfig},
    scoped_futures::ScopedBoxFuture,
    AsyncConnection, AsyncPgConnection, CacheSize, SimpleAsyncConnection,
};
use opentalk_admin_settings as settings;

use crate::{
    connection::DbConnection,
    metrics::DatabaseMetrics,
    routing::{self, RoutingTarget},
    DatabaseError,
};

type DbPool = Pool<AsyncPgConnection>;

/// Statement timeout applied to the write pool unless configured otherwise
const DEFAULT_WRITE_STATEMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Statement timeout applied to the read pool unless configured otherwise
const DEFAULT_READ_STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

struct PoolEntry {
    pool: DbPool,
    leak_threshold: Duration,
}

/// The routing datasource
///
/// Owns one deadpool connection pool per routing target and hands out
/// connections according to the task's current routing tag. The write pool
/// runs with regular transactional settings; connections of the read pool
/// are flagged read-only at establish time and run in auto-commit.
pub struct Db {
    metrics: Option<Arc<DatabaseMetrics>>,
    write: PoolEntry,
    read: PoolEntry,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Db")
    }
}

impl Db {
    /// Creates a new Db instance from the specified database settings.
    #[tracing::instrument(skip(db_settings))]
    pub fn connect(db_settings: &settings::Database) -> crate::Result<Self> {
        Ok(Self {
            metrics: None,
            write: build_pool(&db_settings.write, RoutingTarget::Write)?,
            read: build_pool(&db_settings.read, RoutingTarget::Read)?,
        })
    }

    /// Set the metrics to use for both connection pools
    pub fn set_metrics(&mut self, metrics: Arc<DatabaseMetrics>) {
        self.metrics = Some(metrics);
    }

    /// Returns an established connection from the pool selected by the
    /// routing tag in effect for the current task
    ///
    /// Fails when a transaction is open on this task and the current tag
    /// differs from the transaction's pinned target; a transaction stays on
    /// its pool until commit or rollback.
    #[tracing::instrument(skip_all)]
    pub async fn get_conn(&self) -> crate::Result<DbConnection> {
        let target = routing::current_target();

        if let Some(active) = routing::transaction_target() {
            if active != target {
                return Err(DatabaseError::RoutingChangedMidTransaction {
                    active,
                    requested: target,
                });
            }
        }

        let entry = match target {
            RoutingTarget::Write => &self.write,
            RoutingTarget::Read => &self.read,
        };

        let res = entry.pool.get().await;
        let state = entry.pool.status();

        if let Some(metrics) = &self.metrics {
            metrics.record_pool_status(
                target.label(),
                state.size as u64,
                u64::try_from(state.available).unwrap_or_default(),
            );
        }

        match res {
            Ok(conn) => Ok(DbConnection {
                conn,
                target,
                metrics: self.metrics.clone(),
                checked_out_at: Instant::now(),
                leak_threshold: entry.leak_threshold,
                instrumentation: Arc::new(Mutex::new(
                    diesel::connection::get_default_instrumentation(),
                )),
            }),
            Err(e) => {
                let state = entry.pool.status();
                log::error!(
                    "Unable to get {target} connection from connection pool.
                                Error: {e}
                                Pool State:
                                    {state:?}",
                );
                Err(DatabaseError::DeadpoolError { source: e })
            }
        }
    }

    /// Runs `callback` on a write-routed connection inside a database
    /// transaction
    ///
    /// The routing target is pinned for the span of the transaction;
    /// acquiring a differently routed connection inside the callback fails
    /// with [`DatabaseError::RoutingChangedMidTransaction`].
    pub async fn write_transaction<'a, R, F>(&self, callback: F) -> crate::Result<R>
    where
        F: for<'r> FnOnce(&'r mut DbConnection) -> ScopedBoxFuture<'a, 'r, crate::Result<R>>
            + Send
            + 'a,
        R: Send + 'a,
    {
        routing::with_write(async {
            let mut conn = self.get_conn().await?;

            routing::pin_transaction(RoutingTarget::Write, async move {
                conn.transaction(callback).await
            })
            .await
        })
        .await
    }
}

fn build_pool(pool_settings: &settings::Pool, target: RoutingTarget) -> crate::Result<PoolEntry> {
    let statement_timeout = pool_settings.statement_timeout().unwrap_or(match target {
        RoutingTarget::Write => DEFAULT_WRITE_STATEMENT_TIMEOUT,
        RoutingTarget::Read => DEFAULT_READ_STATEMENT_TIMEOUT,
    });
    let setup_sql = connection_setup_sql(target, statement_timeout);
    let cache_size = match NonZeroUsize::new(pool_settings.statement_cache_capacity) {
        Some(capacity) => CacheSize::Bounded(capacity),
        None => CacheSize::Unbounded,
    };

    let mut config = ManagerConfig::default();
    config.custom_setup = Box::new(move |url: &str| {
        let setup_sql = setup_sql.clone();
        Box::pin(async move {
            let mut conn = AsyncPgConnection::establish(url).await?;
            conn.set_prepared_statement_cache_size(cache_size);
            conn.batch_execute(&setup_sql)
                .await
                .map_err(diesel::ConnectionError::CouldntSetupConfiguration)?;
            Ok(conn)
        })
    });

    let manager =
        AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(&pool_settings.url, config);

    let pool = Pool::builder(manager)
        .max_size(pool_settings.max_connections as usize)
        .create_timeout(Some(pool_settings.connect_timeout()))
        .wait_timeout(Some(pool_settings.connect_timeout()))
        .runtime(Runtime::Tokio1)
        .build()?;

    Ok(PoolEntry {
        pool,
        leak_threshold: pool_settings.leak_detection_threshold(),
    })
}

fn connection_setup_sql(target: RoutingTarget, statement_timeout: Duration) -> String {
    let mut sql = format!("SET statement_timeout = {};", statement_timeout.as_millis());

    if target == RoutingTarget::Read {
        sql.push_str("SET default_transaction_read_only = on;");
    }

    sql
}
