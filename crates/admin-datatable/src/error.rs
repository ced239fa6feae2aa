// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use opentalk_admin_database::DatabaseError;
use opentalk_admin_types_api_v1::error::{ApiError, ErrorKind, ValidationErrorEntry};

/// Failures while validating or registering a search descriptor
///
/// These are raised at startup; a service with an invalid descriptor does
/// not become ready.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("no entity graph declared for `{entity}`")]
    UnknownEntity { entity: String },

    #[error("path `{path}` on `{entity}` does not resolve: unknown segment `{segment}`")]
    UnresolvablePath {
        entity: String,
        path: String,
        segment: String,
    },

    #[error("descriptor for `{entity}` declares no default search columns")]
    EmptyDefaultSearchColumns { entity: String },

    #[error("`{path}` on `{entity}` must be searchable or a subquery field to be used in `{role}`")]
    NotSearchable {
        entity: String,
        path: String,
        role: &'static str,
    },

    #[error("alias `{alias}` on `{entity}` shadows a real field")]
    AliasShadowsField { entity: String, alias: String },

    #[error("`{path}` on `{entity}` is declared both as a fetch join collection and a subquery field")]
    FetchJoinConflictsWithSubquery { entity: String, path: String },

    #[error("sortable path `{path}` on `{entity}` is a subquery field and cannot back an ORDER BY")]
    SortableSubqueryField { entity: String, path: String },

    #[error("descriptor for `{entity}` joins a collection but does not set use_distinct")]
    DistinctRequired { entity: String },

    #[error("subquery template for `{path}` on `{entity}` is missing the `{{param}}` placeholder")]
    InvalidSubqueryTemplate { entity: String, path: String },

    #[error("a descriptor for `{entity}` is already registered")]
    DuplicateDescriptor { entity: String },
}

/// Failures while composing or executing a search query
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The request references fields outside the descriptor's declarations
    #[error("{message}")]
    Validation {
        message: String,
        entries: Vec<ValidationErrorEntry>,
    },

    /// No descriptor registered for the requested entity
    #[error("no search descriptor registered for entity `{entity}`")]
    UnknownEntity { entity: String },

    /// The composer produced an inconsistent plan, e.g. a placeholder
    /// without its bind parameter
    #[error("composed plan is inconsistent: {message}")]
    InvariantViolation { message: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl SearchError {
    pub(crate) fn validation(entries: Vec<ValidationErrorEntry>) -> Self {
        let fields = entries
            .iter()
            .filter_map(|entry| entry.field.as_deref())
            .collect::<Vec<_>>()
            .join(", ");

        Self::Validation {
            message: format!("invalid data table request, offending fields: {fields}"),
            entries,
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(error: SearchError) -> Self {
        match error {
            SearchError::Validation { message, entries } => ApiError::validation(message, entries),
            SearchError::UnknownEntity { .. } | SearchError::InvariantViolation { .. } => {
                ApiError::from_kind(ErrorKind::InvariantViolation).with_message(error.to_string())
            }
            SearchError::Database(db) => api_error_from_database(&db),
        }
    }
}

/// Map a database error onto the API error taxonomy
pub fn api_error_from_database(error: &DatabaseError) -> ApiError {
    use diesel::result::DatabaseErrorKind;

    let kind = match error {
        DatabaseError::NotFound => ErrorKind::NotFound,
        DatabaseError::DeadpoolError { .. } | DatabaseError::DeadpoolBuildError { .. } => {
            ErrorKind::InfrastructureUnavailable
        }
        DatabaseError::RoutingChangedMidTransaction { .. } | DatabaseError::WriteOnReadRoute => {
            ErrorKind::InvariantViolation
        }
        DatabaseError::DieselError {
            source: diesel::result::Error::DatabaseError(db_kind, _),
        } => match db_kind {
            DatabaseErrorKind::UniqueViolation | DatabaseErrorKind::ForeignKeyViolation => {
                ErrorKind::Conflict
            }
            DatabaseErrorKind::CheckViolation | DatabaseErrorKind::NotNullViolation => {
                ErrorKind::ConstraintViolation
            }
            _ => ErrorKind::Internal,
        },
        _ => ErrorKind::Internal,
    };

    ApiError::from_kind(kind)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn database_errors_map_to_taxonomy() {
        assert_eq!(
            api_error_from_database(&DatabaseError::NotFound).status().as_u16(),
            404
        );
        assert_eq!(
            api_error_from_database(&DatabaseError::WriteOnReadRoute)
                .status()
                .as_u16(),
            500
        );
    }

    #[test]
    fn validation_error_carries_entries() {
        let error = SearchError::validation(vec![ValidationErrorEntry::new(
            "role.name",
            "",
            "not_sortable",
            Some("field is not sortable"),
        )]);

        let api_error = ApiError::from(error);
        assert_eq!(api_error.status().as_u16(), 400);
        assert_eq!(api_error.validation_errors().len(), 1);
        assert_eq!(
            api_error.validation_errors()[0].field.as_deref(),
            Some("role.name")
        );
    }
}
