// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Plan execution
//!
//! Runs a composed [`ExecutionPlan`] on the read route: the data query
//! first, then the matching count query on the same connection. A count
//! failure after a successful data query is surfaced, never coerced into an
//! empty total.

use diesel::pg::Pg;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_types;
use diesel_async::RunQueryDsl;

use opentalk_admin_database::{with_read, DatabaseError, Db};
use opentalk_admin_types_api_v1::{Page, Pagination};

use crate::bind::BindValue;
use crate::error::SearchError;
use crate::plan::ExecutionPlan;

#[derive(diesel::QueryableByName)]
struct CountRow {
    #[diesel(sql_type = sql_types::BigInt)]
    total: i64,
}

/// Execute a plan and assemble the resulting page
///
/// Both queries run on the read route; the caller's routing scope is
/// restored afterwards.
#[tracing::instrument(err, skip_all)]
pub async fn fetch_page<T>(
    db: &Db,
    plan: &ExecutionPlan,
    pagination: Pagination,
) -> Result<Page<T>, SearchError>
where
    T: diesel::deserialize::QueryableByName<Pg> + Send + 'static,
{
    with_read(async {
        let mut conn = db.get_conn().await?;

        let (data_sql, data_binds) = plan.positional(plan.sql())?;
        let content: Vec<T> = build_query(&data_sql, &data_binds)
            .load(&mut conn)
            .await
            .map_err(DatabaseError::from)?;

        let (count_sql, count_binds) = plan.positional(plan.count_sql())?;
        let total = build_query(&count_sql, &count_binds)
            .load::<CountRow>(&mut conn)
            .await
            .map_err(DatabaseError::from)?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::Custom {
                message: "count query returned no rows".to_owned(),
            })?
            .total;

        Ok(Page::new(pagination.page, pagination.size, total, content))
    })
    .await
}

/// Build a boxed raw query with the plan's typed binds attached
fn build_query(sql: &str, binds: &[&BindValue]) -> BoxedSqlQuery<'static, Pg, SqlQuery> {
    let mut query = diesel::sql_query(sql).into_boxed();

    for bind in binds {
        query = match bind {
            BindValue::Text(value) => query.bind::<sql_types::Text, _>(value.clone()),
            BindValue::Int(value) => query.bind::<sql_types::Integer, _>(*value),
            BindValue::Long(value) => query.bind::<sql_types::BigInt, _>(*value),
            BindValue::Decimal(value) => query.bind::<sql_types::Numeric, _>(value.clone()),
            BindValue::Bool(value) => query.bind::<sql_types::Bool, _>(*value),
            BindValue::Date(value) => query.bind::<sql_types::Date, _>(*value),
            BindValue::Timestamp(value) => query.bind::<sql_types::Timestamptz, _>(*value),
            BindValue::Uuid(value) => query.bind::<sql_types::Uuid, _>(*value),
            BindValue::List(_) => {
                unreachable!("list binds are flattened during the positional rewrite")
            }
        };
    }

    query
}
