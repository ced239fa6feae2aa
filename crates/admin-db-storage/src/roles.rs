// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Contains the role specific database structs and queries
use chrono::{DateTime, Utc};
use derive_more::{AsRef, Display, From, FromStr, Into};
use diesel::{ExpressionMethods, Identifiable, Insertable, OptionalExtension, QueryDsl, Queryable};
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

use super::schema::roles;

/// Logical entity name of roles in the search registry
pub const ENTITY: &str = "Role";

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
pub struct RoleId(Uuid);

impl RoleId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Diesel role struct
#[derive(Debug, Clone, Queryable, QueryableByName, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = roles)]
pub struct Role {
    pub id: RoleId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub description: Option<String>,
}

impl Role {
    #[tracing::instrument(err, skip_all)]
    pub async fn get(conn: &mut DbConnection, role_id: RoleId) -> Result<Role> {
        let role = roles::table
            .filter(roles::id.eq(role_id))
            .get_result(conn)
            .await?;

        Ok(role)
    }

    /// Returns None if no role matches `name`
    #[tracing::instrument(err, skip_all)]
    pub async fn get_by_name(conn: &mut DbConnection, name: &str) -> Result<Option<Role>> {
        let role = roles::table
            .filter(roles::name.eq(name))
            .get_result(conn)
            .await
            .optional()?;

        Ok(role)
    }

    #[tracing::instrument(err, skip_all)]
    pub async fn delete_by_id(conn: &mut DbConnection, role_id: RoleId) -> Result<()> {
        conn.ensure_writable()?;

        diesel::delete(roles::table.filter(roles::id.eq(role_id)))
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Run a data-table search over roles
    #[tracing::instrument(err, skip_all)]
    pub async fn data_table(
        db: &Db,
        registry: &SearchRegistry,
        request: &DataTableRequest,
    ) -> Result<Page<Role>, SearchError> {
        let plan = QueryComposer::new(registry).compose(ENTITY, request)?;

        fetch_page(db, &plan, request.pagination).await
    }
}

/// Diesel insertable role struct
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = roles)]
pub struct NewRole {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
}

impl NewRole {
    #[tracing::instrument(err, skip_all)]
    pub async fn insert(self, conn: &mut DbConnection) -> Result<Role> {
        conn.ensure_writable()?;

        let role = diesel::insert_into(roles::table)
            .values(self)
            .get_result(conn)
            .await?;

        Ok(role)
    }
}

/// Diesel role changeset
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = roles)]
pub struct UpdateRole {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

impl UpdateRole {
    #[tracing::instrument(err, skip_all)]
    pub async fn apply(self, conn: &mut DbConnection, role_id: RoleId) -> Result<Role> {
        conn.ensure_writable()?;

        let target = roles::table.filter(roles::id.eq(role_id));
        let role = diesel::update(target)
            .set((self, roles::updated_at.eq(Utc::now())))
            .get_result(conn)
            .await?;

        Ok(role)
    }
}

/// The declared field graph of roles
pub fn entity_graph() -> EntityGraph {
    EntityGraph::new(ENTITY, "roles", "id")
        .field("id", "id", FieldType::Uuid)
        .field("name", "name", FieldType::Text)
        .field("description", "description", FieldType::Text)
        .field("createdOn", "created_at", FieldType::Timestamp)
        .one_to_many("users", super::users::ENTITY, "role_id")
}

/// The search declaration for role data tables
pub fn search_descriptor() -> SearchDescriptor {
    SearchDescriptor::builder(ENTITY)
        .searchable("name")
        .searchable("description")
        .searchable("createdOn")
        .sortable("name")
        .sortable("createdOn")
        .default_search_column("name")
        .default_search_column("description")
        .default_sort("name", SortDirection::Asc)
        .build()
}
