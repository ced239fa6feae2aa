// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Contains the user specific database structs, queries and the user search
//! descriptor
use chrono::{DateTime, Utc};
use derive_more::{AsRef, Display, From, FromStr, Into};
use diesel::{ExpressionMethods, Identifiable, Insertable, OptionalExtension, QueryDsl, Queryable};
use diesel_async::RunQueryDsl;
use diesel_newtype::DieselNewtype;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use opentalk_admin_database::{Db, DbConnection, Result};
use opentalk_admin_datatable::{
    fetch_page, EntityGraph, FieldType, QueryComposer, SearchDescriptor, SearchError,
    SearchRegistry, SubquerySpec,
};
use opentalk_admin_types_api_v1::{DataTableRequest, Page, SortDirection};

use super::roles::RoleId;
use super::schema::users;

/// Logical entity name of users in the search registry
pub const ENTITY: &str = "User";

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
pub struct UserId(Uuid);

impl UserId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Lifecycle state persisted in the `status` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum UserStatus {
    Invited,
    Active,
    Blocked,
}

/// Diesel user struct
///
/// Is used as a result in various queries. Represents a user column
#[derive(Clone, Queryable, QueryableByName, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub is_active: i32,
    pub status: String,
    pub last_login_on: Option<DateTime<Utc>>,
    pub role_id: RoleId,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("full_name", &self.full_name)
            .finish()
    }
}

impl User {
    /// The parsed lifecycle state, None for unknown column values
    pub fn user_status(&self) -> Option<UserStatus> {
        self.status.parse().ok()
    }

    /// Get a user with the given `id`
    ///
    /// If no user exists with `user_id` this returns an Error
    #[tracing::instrument(err, skip_all)]
    pub async fn get(conn: &mut DbConnection, user_id: UserId) -> Result<User> {
        let user = users::table
            .filter(users::id.eq(user_id))
            .get_result(conn)
            .await?;

        Ok(user)
    }

    /// Get a user with the given email
    ///
    /// Returns None if no user matches `email`
    #[tracing::instrument(err, skip_all)]
    pub async fn get_by_email(conn: &mut DbConnection, email: &str) -> Result<Option<User>> {
        let user = users::table
            .filter(users::email.eq(email))
            .get_result(conn)
            .await
            .optional()?;

        Ok(user)
    }

    /// Get all users with the given role
    #[tracing::instrument(err, skip_all)]
    pub async fn get_by_role(conn: &mut DbConnection, role_id: RoleId) -> Result<Vec<User>> {
        let users = users::table
            .filter(users::role_id.eq(role_id))
            .load(conn)
            .await?;

        Ok(users)
    }

    /// Delete the user with the given `id`
    #[tracing::instrument(err, skip_all)]
    pub async fn delete_by_id(conn: &mut DbConnection, user_id: UserId) -> Result<()> {
        conn.ensure_writable()?;

        diesel::delete(users::table.filter(users::id.eq(user_id)))
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Run a data-table search over users
    ///
    /// Composes the query from the registered descriptor and executes it on
    /// the read route.
    #[tracing::instrument(err, skip_all)]
    pub async fn data_table(
        db: &Db,
        registry: &SearchRegistry,
        request: &DataTableRequest,
    ) -> Result<Page<User>, SearchError> {
        let plan = QueryComposer::new(registry).compose(ENTITY, request)?;

        fetch_page(db, &plan, request.pagination).await
    }
}

/// Diesel insertable user struct
///
/// Represents fields that have to be provided on user insertion
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub is_active: i32,
    pub status: String,
    pub role_id: RoleId,
}

impl NewUser {
    #[tracing::instrument(err, skip_all)]
    pub async fn insert(self, conn: &mut DbConnection) -> Result<User> {
        conn.ensure_writable()?;

        let user = diesel::insert_into(users::table)
            .values(self)
            .get_result(conn)
            .await?;

        Ok(user)
    }
}

/// Diesel user changeset
///
/// Represents a changeset of a user; `updated_at` is touched on every apply
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = users)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<Option<String>>,
    pub is_active: Option<i32>,
    pub status: Option<String>,
    pub last_login_on: Option<DateTime<Utc>>,
    pub role_id: Option<RoleId>,
}

impl UpdateUser {
    #[tracing::instrument(err, skip_all)]
    pub async fn apply(self, conn: &mut DbConnection, user_id: UserId) -> Result<User> {
        conn.ensure_writable()?;

        let target = users::table.filter(users::id.eq(user_id));
        let user = diesel::update(target)
            .set((self, users::updated_at.eq(Utc::now())))
            .get_result(conn)
            .await?;

        Ok(user)
    }
}

/// The declared field graph of users
pub fn entity_graph() -> EntityGraph {
    EntityGraph::new(ENTITY, "users", "id")
        .field("id", "id", FieldType::Uuid)
        .field("email", "email", FieldType::Text)
        .field("fullName", "full_name", FieldType::Text)
        .field("phone", "phone", FieldType::Text)
        .field("isActive", "is_active", FieldType::BoolAsInt)
        .field("status", "status", FieldType::Enum)
        .field("createdOn", "created_at", FieldType::Timestamp)
        .field("lastLoginOn", "last_login_on", FieldType::Timestamp)
        .many_to_one("role", super::roles::ENTITY, "role_id")
        .many_to_many(
            "companies",
            super::companies::ENTITY,
            "company_users",
            "user_id",
            "company_id",
        )
}

/// The search declaration for user data tables
///
/// Company membership is answered by an `EXISTS` subquery instead of joining
/// the junction table, so searches never fan out over large memberships.
pub fn search_descriptor() -> SearchDescriptor {
    SearchDescriptor::builder(ENTITY)
        .searchable("fullName")
        .searchable("email")
        .searchable("phone")
        .searchable("status")
        .searchable("isActive")
        .searchable("createdOn")
        .searchable("lastLoginOn")
        .searchable("role.name")
        .sortable("fullName")
        .sortable("email")
        .sortable("createdOn")
        .default_search_column("fullName")
        .default_search_column("email")
        .default_sort("fullName", SortDirection::Asc)
        .alias("roleName", "role.name")
        .alias("companyName", "companies.companyName")
        .fetch_join("role")
        .subquery_field(
            "companies.companyName",
            SubquerySpec::new(
                "EXISTS (SELECT 1 FROM company_users cu \
                 JOIN companies c ON c.id = cu.company_id \
                 WHERE cu.user_id = e.id \
                 AND LOWER(c.company_name) LIKE LOWER(CONCAT('%', :{param}, '%')))",
            ),
        )
        .build()
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn user_search_plan() {
        let registry = crate::build_registry().unwrap();

        let request: DataTableRequest = serde_json::from_str(
            r#"{
                "pagination": {"page":0,"size":10},
                "searchFilter": {"searchText":"ali"}
            }"#,
        )
        .unwrap();

        let plan = QueryComposer::new(&registry).compose(ENTITY, &request).unwrap();

        assert!(plan.sql().contains("LEFT JOIN roles role_ ON role_.id = e.role_id"));
        assert!(plan.sql().contains("LOWER(e.full_name) LIKE"));
        assert!(plan.sql().contains("ORDER BY e.full_name ASC"));
    }

    #[test]
    fn status_string_round_trip() {
        assert_eq!(UserStatus::Active.to_string(), "active");
        assert_eq!("blocked".parse::<UserStatus>().unwrap(), UserStatus::Blocked);
    }

    #[test]
    fn company_membership_filter_uses_the_subquery() {
        let registry = crate::build_registry().unwrap();

        let request: DataTableRequest = serde_json::from_str(
            r#"{
                "pagination": {"page":0,"size":10},
                "columns": [{"columnName":"companyName","filter":"cnt:acme"}]
            }"#,
        )
        .unwrap();

        let plan = QueryComposer::new(&registry).compose(ENTITY, &request).unwrap();

        assert!(plan.sql().contains("EXISTS (SELECT 1 FROM company_users cu"));
        assert!(!plan.sql().contains("LEFT JOIN company_users"));
        assert_eq!(plan.joins().len(), 1, "only the role fetch join remains");
    }
}
