// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Per-entity search declarations
//!
//! A [`SearchDescriptor`] is a plain value record describing how one entity
//! may be searched: which paths are searchable and sortable, the default
//! search columns and sort order, client-facing aliases, eagerly fetched
//! associations and predicates answered by `EXISTS` subqueries. Descriptors
//! are immutable once registered.

use rustc_hash::FxHashMap;

use opentalk_admin_types_api_v1::SortDirection;

use crate::field_type::FieldType;

/// A default sort entry, `path` ordered by `direction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub path: String,
    pub direction: SortDirection,
}

/// An `EXISTS (...)` template answering predicates on a collection path
///
/// The template contains a `{param}` placeholder which is replaced with the
/// bind parameter name at composition time, e.g.
///
/// ```text
/// EXISTS (SELECT 1 FROM company_users cu
///         JOIN companies c ON c.id = cu.company_id
///         WHERE cu.user_id = e.id
///           AND LOWER(c.company_name) LIKE LOWER(CONCAT('%', :{param}, '%')))
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubquerySpec {
    template: String,
}

impl SubquerySpec {
    pub fn new<T: Into<String>>(template: T) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Render the template with the given bind parameter name
    pub fn render(&self, param: &str) -> String {
        self.template.replace("{param}", param)
    }
}

/// Immutable per-entity search declaration
#[derive(Debug, Clone)]
pub struct SearchDescriptor {
    pub(crate) entity: &'static str,
    pub(crate) searchable: Vec<String>,
    pub(crate) sortable: Vec<String>,
    pub(crate) default_search_columns: Vec<String>,
    pub(crate) default_sort_fields: Vec<SortField>,
    pub(crate) aliases: FxHashMap<String, String>,
    pub(crate) fetch_joins: Vec<String>,
    pub(crate) subquery_fields: FxHashMap<String, SubquerySpec>,
    pub(crate) field_types: FxHashMap<String, FieldType>,
    pub(crate) use_distinct: bool,
}

impl SearchDescriptor {
    pub fn builder(entity: &'static str) -> SearchDescriptorBuilder {
        SearchDescriptorBuilder {
            descriptor: SearchDescriptor {
                entity,
                searchable: Vec::new(),
                sortable: Vec::new(),
                default_search_columns: Vec::new(),
                default_sort_fields: Vec::new(),
                aliases: FxHashMap::default(),
                fetch_joins: Vec::new(),
                subquery_fields: FxHashMap::default(),
                field_types: FxHashMap::default(),
                use_distinct: false,
            },
        }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    /// Resolve a client-facing name through the alias table, single hop
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn is_searchable(&self, path: &str) -> bool {
        self.searchable.iter().any(|p| p == path)
    }

    pub fn is_sortable(&self, path: &str) -> bool {
        self.sortable.iter().any(|p| p == path)
    }

    pub fn subquery(&self, path: &str) -> Option<&SubquerySpec> {
        self.subquery_fields.get(path)
    }

    /// The declared type override for a path, if any
    pub fn field_type_override(&self, path: &str) -> Option<FieldType> {
        self.field_types.get(path).copied()
    }

    pub fn sortable_paths(&self) -> &[String] {
        &self.sortable
    }

    pub fn use_distinct(&self) -> bool {
        self.use_distinct
    }
}

/// Builder for [`SearchDescriptor`]
///
/// Finished descriptors are handed to
/// [`SearchRegistryBuilder::descriptor`](crate::SearchRegistryBuilder::descriptor),
/// which validates them against the entity graph.
#[derive(Debug)]
pub struct SearchDescriptorBuilder {
    descriptor: SearchDescriptor,
}

impl SearchDescriptorBuilder {
    /// Declare a path as searchable
    pub fn searchable(mut self, path: &str) -> Self {
        self.descriptor.searchable.push(path.to_owned());
        self
    }

    /// Declare a path as sortable
    pub fn sortable(mut self, path: &str) -> Self {
        self.descriptor.sortable.push(path.to_owned());
        self
    }

    /// Add a column to the default global search set
    pub fn default_search_column(mut self, path: &str) -> Self {
        self.descriptor.default_search_columns.push(path.to_owned());
        self
    }

    /// Append a default sort entry
    pub fn default_sort(mut self, path: &str, direction: SortDirection) -> Self {
        self.descriptor.default_sort_fields.push(SortField {
            path: path.to_owned(),
            direction,
        });
        self
    }

    /// Map a client-facing name to an internal dotted path
    pub fn alias(mut self, name: &str, path: &str) -> Self {
        self.descriptor
            .aliases
            .insert(name.to_owned(), path.to_owned());
        self
    }

    /// Eagerly join the named association
    pub fn fetch_join(mut self, relation_path: &str) -> Self {
        self.descriptor.fetch_joins.push(relation_path.to_owned());
        self
    }

    /// Answer predicates on `path` with an `EXISTS` subquery instead of a join
    pub fn subquery_field(mut self, path: &str, spec: SubquerySpec) -> Self {
        self.descriptor.subquery_fields.insert(path.to_owned(), spec);
        self
    }

    /// Override the logical type of a path
    pub fn field_type(mut self, path: &str, field_type: FieldType) -> Self {
        self.descriptor.field_types.insert(path.to_owned(), field_type);
        self
    }

    /// Emit `SELECT DISTINCT`, required whenever a collection is joined
    pub fn use_distinct(mut self) -> Self {
        self.descriptor.use_distinct = true;
        self
    }

    pub fn build(self) -> SearchDescriptor {
        self.descriptor
    }
}
