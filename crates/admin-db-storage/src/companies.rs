// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Contains the company specific database structs and queries
use chrono::{DateTime, Utc};
use derive_more::{AsRef, Display, From, FromStr, Into};
use diesel::{ExpressionMethods, Identifiable, Insertable, OptionalExtension, QueryDsl, Queryable};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::RunQueryDsl;
use diesel_newtype::DieselNewtype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use opentalk_admin_database::{Db, DbConnection, Result};
use opentalk_admin_datatable::{
    fetch_page, EntityGraph, FieldType, QueryComposer, SearchDescriptor, SearchError,
    SearchRegistry,
};
use opentalk_admin_types_api_v1::{DataTableRequest, Page, SortDirection};

use super::schema::{companies, company_users};
use super::users::UserId;

/// Logical entity name of companies in the search registry
pub const ENTITY: &str = "Company";

#[derive(
    AsRef,
    Display,
    From,
    FromStr,
    Into,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsExpression,
    FromSqlRow,
    DieselNewtype,
)]
#[diesel(sql_type = diesel::sql_types::Uuid)]
pub struct CompanyId(Uuid);

impl CompanyId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Diesel company struct
#[derive(Debug, Clone, Queryable, QueryableByName, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = companies)]
pub struct Company {
    pub id: CompanyId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub company_name: String,
    pub registration_number: Option<String>,
    pub is_active: i32,
}

/// Diesel company membership struct
#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = company_users)]
pub struct CompanyUser {
    pub company_id: CompanyId,
    pub user_id: UserId,
}

impl Company {
    #[tracing::instrument(err, skip_all)]
    pub async fn get(conn: &mut DbConnection, company_id: CompanyId) -> Result<Company> {
        let company = companies::table
            .filter(companies::id.eq(company_id))
            .get_result(conn)
            .await?;

        Ok(company)
    }

    /// Returns None if no company matches `name`
    #[tracing::instrument(err, skip_all)]
    pub async fn get_by_name(conn: &mut DbConnection, name: &str) -> Result<Option<Company>> {
        let company = companies::table
            .filter(companies::company_name.eq(name))
            .get_result(conn)
            .await
            .optional()?;

        Ok(company)
    }

    /// The user ids assigned to this company
    #[tracing::instrument(err, skip_all)]
    pub async fn member_ids(&self, conn: &mut DbConnection) -> Result<Vec<UserId>> {
        let member_ids = company_users::table
            .select(company_users::user_id)
            .filter(company_users::company_id.eq(self.id))
            .load(conn)
            .await?;

        Ok(member_ids)
    }

    /// Replace the member set of a company
    ///
    /// Runs inside a single write transaction; the routing target stays
    /// pinned to the write pool until commit.
    #[tracing::instrument(err, skip_all)]
    pub async fn replace_members(
        db: &Db,
        company_id: CompanyId,
        member_ids: Vec<UserId>,
    ) -> Result<()> {
        db.write_transaction(|conn| {
            async move {
                diesel::delete(
                    company_users::table.filter(company_users::company_id.eq(company_id)),
                )
                .execute(conn)
                .await?;

                let memberships: Vec<CompanyUser> = member_ids
                    .into_iter()
                    .map(|user_id| CompanyUser {
                        company_id,
                        user_id,
                    })
                    .collect();

                diesel::insert_into(company_users::table)
                    .values(memberships)
                    .execute(conn)
                    .await?;

                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    /// Run a data-table search over companies
    #[tracing::instrument(err, skip_all)]
    pub async fn data_table(
        db: &Db,
        registry: &SearchRegistry,
        request: &DataTableRequest,
    ) -> Result<Page<Company>, SearchError> {
        let plan = QueryComposer::new(registry).compose(ENTITY, request)?;

        fetch_page(db, &plan, request.pagination).await
    }
}

/// Diesel insertable company struct
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = companies)]
pub struct NewCompany {
    pub id: CompanyId,
    pub company_name: String,
    pub registration_number: Option<String>,
    pub is_active: i32,
}

impl NewCompany {
    #[tracing::instrument(err, skip_all)]
    pub async fn insert(self, conn: &mut DbConnection) -> Result<Company> {
        conn.ensure_writable()?;

        let company = diesel::insert_into(companies::table)
            .values(self)
            .get_result(conn)
            .await?;

        Ok(company)
    }
}

/// Diesel company changeset
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = companies)]
pub struct UpdateCompany {
    pub company_name: Option<String>,
    pub registration_number: Option<Option<String>>,
    pub is_active: Option<i32>,
}

impl UpdateCompany {
    #[tracing::instrument(err, skip_all)]
    pub async fn apply(self, conn: &mut DbConnection, company_id: CompanyId) -> Result<Company> {
        conn.ensure_writable()?;

        let target = companies::table.filter(companies::id.eq(company_id));
        let company = diesel::update(target)
            .set((self, companies::updated_at.eq(Utc::now())))
            .get_result(conn)
            .await?;

        Ok(company)
    }
}

/// The declared field graph of companies
pub fn entity_graph() -> EntityGraph {
    EntityGraph::new(ENTITY, "companies", "id")
        .field("id", "id", FieldType::Uuid)
        .field("companyName", "company_name", FieldType::Text)
        .field("registrationNumber", "registration_number", FieldType::Text)
        .field("isActive", "is_active", FieldType::BoolAsInt)
        .field("createdOn", "created_at", FieldType::Timestamp)
        .many_to_many(
            "members",
            super::users::ENTITY,
            "company_users",
            "company_id",
            "user_id",
        )
}

/// The search declaration for company data tables
pub fn search_descriptor() -> SearchDescriptor {
    SearchDescriptor::builder(ENTITY)
        .searchable("companyName")
        .searchable("registrationNumber")
        .searchable("isActive")
        .searchable("createdOn")
        .sortable("companyName")
        .sortable("createdOn")
        .default_search_column("companyName")
        .default_search_column("registrationNumber")
        .default_sort("companyName", SortDirection::Asc)
        .alias("name", "companyName")
        .build()
}
