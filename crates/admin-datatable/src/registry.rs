// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! The process-wide descriptor registry
//!
//! Built once at startup and sealed afterwards: the builder validates every
//! descriptor against the declared entity graphs, and the finished
//! [`SearchRegistry`] is an immutable, cheaply clonable handle. A descriptor
//! that fails validation keeps the service from becoming ready.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::descriptor::SearchDescriptor;
use crate::error::{DescriptorError, SearchError};
use crate::graph::{EntityGraph, GraphRegistry, RelationStep};

/// Builder collecting entity graphs and descriptors at startup
#[derive(Debug, Default)]
pub struct SearchRegistryBuilder {
    graphs: GraphRegistry,
    descriptors: FxHashMap<&'static str, SearchDescriptor>,
}

impl SearchRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity graph
    pub fn graph(mut self, graph: EntityGraph) -> Self {
        self.graphs.insert(graph);
        self
    }

    /// Register a descriptor, validating it against the declared graphs
    pub fn descriptor(mut self, descriptor: SearchDescriptor) -> Result<Self, DescriptorError> {
        validate(&self.graphs, &descriptor)?;

        if self.descriptors.contains_key(descriptor.entity()) {
            return Err(DescriptorError::DuplicateDescriptor {
                entity: descriptor.entity().to_owned(),
            });
        }

        self.descriptors.insert(descriptor.entity(), descriptor);
        Ok(self)
    }

    /// Seal the registry
    pub fn build(self) -> SearchRegistry {
        SearchRegistry {
            inner: Arc::new(Inner {
                graphs: self.graphs,
                descriptors: self.descriptors,
            }),
        }
    }
}

#[derive(Debug)]
struct Inner {
    graphs: GraphRegistry,
    descriptors: FxHashMap<&'static str, SearchDescriptor>,
}

/// Sealed, shareable descriptor registry
#[derive(Debug, Clone)]
pub struct SearchRegistry {
    inner: Arc<Inner>,
}

impl SearchRegistry {
    pub fn descriptor(&self, entity: &str) -> Result<&SearchDescriptor, SearchError> {
        self.inner
            .descriptors
            .get(entity)
            .ok_or_else(|| SearchError::UnknownEntity {
                entity: entity.to_owned(),
            })
    }

    pub fn graphs(&self) -> &GraphRegistry {
        &self.inner.graphs
    }

    /// The sortable field paths of an entity, for request-level validators
    pub fn sortable_fields(&self, entity: &str) -> Option<&[String]> {
        self.inner
            .descriptors
            .get(entity)
            .map(|descriptor| descriptor.sortable_paths())
    }
}

fn validate(graphs: &GraphRegistry, descriptor: &SearchDescriptor) -> Result<(), DescriptorError> {
    let entity = descriptor.entity();

    let graph = graphs
        .get(entity)
        .ok_or_else(|| DescriptorError::UnknownEntity {
            entity: entity.to_owned(),
        })?;

    if descriptor.default_search_columns.is_empty() {
        return Err(DescriptorError::EmptyDefaultSearchColumns {
            entity: entity.to_owned(),
        });
    }

    // every declared path must resolve against the entity graph
    for path in descriptor
        .searchable
        .iter()
        .chain(descriptor.subquery_fields.keys())
    {
        graphs.resolve_path(entity, path)?;
    }

    // default search columns, sortable paths and alias targets must be
    // searchable (or answered by a subquery)
    let in_scope = |path: &str| {
        descriptor.is_searchable(path) || descriptor.subquery_fields.contains_key(path)
    };

    for (role, paths) in [
        (
            "default search columns",
            descriptor.default_search_columns.as_slice(),
        ),
        ("sortable", descriptor.sortable.as_slice()),
    ] {
        for path in paths {
            if !in_scope(path) {
                return Err(DescriptorError::NotSearchable {
                    entity: entity.to_owned(),
                    path: path.clone(),
                    role,
                });
            }
        }
    }

    for (alias, target) in &descriptor.aliases {
        if graph.has_field(alias) || descriptor.is_searchable(alias) {
            return Err(DescriptorError::AliasShadowsField {
                entity: entity.to_owned(),
                alias: alias.clone(),
            });
        }

        if !in_scope(target) {
            return Err(DescriptorError::NotSearchable {
                entity: entity.to_owned(),
                path: target.clone(),
                role: "alias target",
            });
        }
    }

    // subquery fields may not be sorted on, there is no column to order by
    for path in &descriptor.sortable {
        if descriptor.subquery_fields.contains_key(path) {
            return Err(DescriptorError::SortableSubqueryField {
                entity: entity.to_owned(),
                path: path.clone(),
            });
        }
    }

    for (path, spec) in &descriptor.subquery_fields {
        // a template without the placeholder renders identically for any parameter
        if spec.render("a") == spec.render("b") {
            return Err(DescriptorError::InvalidSubqueryTemplate {
                entity: entity.to_owned(),
                path: path.clone(),
            });
        }
    }

    let mut joins_collection = false;

    for relation_path in &descriptor.fetch_joins {
        let steps = graphs.resolve_relation(entity, relation_path)?;
        joins_collection |= steps
            .iter()
            .any(|step: &RelationStep<'_>| step.relation.kind.is_collection());

        // a collection answered by a subquery must not also be fetch joined
        for subquery_path in descriptor.subquery_fields.keys() {
            if subquery_path
                .rsplit_once('.')
                .is_some_and(|(prefix, _)| prefix == relation_path)
            {
                return Err(DescriptorError::FetchJoinConflictsWithSubquery {
                    entity: entity.to_owned(),
                    path: subquery_path.clone(),
                });
            }
        }
    }

    // collection-valued searchable paths force a joined collection as well
    joins_collection |= descriptor.searchable.iter().any(|path| {
        !descriptor.subquery_fields.contains_key(path)
            && graphs
                .resolve_path(entity, path)
                .is_ok_and(|resolved| resolved.is_collection())
    });

    if joins_collection && !descriptor.use_distinct {
        return Err(DescriptorError::DistinctRequired {
            entity: entity.to_owned(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use opentalk_admin_types_api_v1::SortDirection;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::descriptor::SubquerySpec;
    use crate::field_type::FieldType;

    fn graphs() -> Vec<EntityGraph> {
        vec![
            EntityGraph::new("User", "users", "id")
                .field("fullName", "full_name", FieldType::Text)
                .field("email", "email", FieldType::Text)
                .many_to_one("role", "Role", "role_id")
                .many_to_many("companies", "Company", "company_users", "user_id", "company_id"),
            EntityGraph::new("Role", "roles", "id").field("name", "name", FieldType::Text),
            EntityGraph::new("Company", "companies", "id").field(
                "companyName",
                "company_name",
                FieldType::Text,
            ),
        ]
    }

    fn builder() -> SearchRegistryBuilder {
        graphs()
            .into_iter()
            .fold(SearchRegistryBuilder::new(), |builder, graph| {
                builder.graph(graph)
            })
    }

    fn user_descriptor() -> SearchDescriptor {
        SearchDescriptor::builder("User")
            .searchable("fullName")
            .searchable("email")
            .searchable("role.name")
            .sortable("fullName")
            .sortable("email")
            .default_search_column("fullName")
            .default_search_column("email")
            .default_sort("fullName", SortDirection::Asc)
            .fetch_join("role")
            .build()
    }

    #[test]
    fn valid_descriptor_registers() {
        let registry = builder().descriptor(user_descriptor()).unwrap().build();

        assert!(registry.descriptor("User").is_ok());
        assert_eq!(
            registry.sortable_fields("User"),
            Some(&["fullName".to_owned(), "email".to_owned()][..])
        );
    }

    #[test]
    fn empty_default_search_columns_fail_registration() {
        let descriptor = SearchDescriptor::builder("User")
            .searchable("fullName")
            .build();

        assert_eq!(
            builder().descriptor(descriptor).unwrap_err(),
            DescriptorError::EmptyDefaultSearchColumns {
                entity: "User".to_owned()
            }
        );
    }

    #[test]
    fn sortable_outside_searchable_fails() {
        let descriptor = SearchDescriptor::builder("User")
            .searchable("fullName")
            .default_search_column("fullName")
            .sortable("email")
            .build();

        assert_eq!(
            builder().descriptor(descriptor).unwrap_err(),
            DescriptorError::NotSearchable {
                entity: "User".to_owned(),
                path: "email".to_owned(),
                role: "sortable",
            }
        );
    }

    #[test]
    fn alias_shadowing_a_field_fails() {
        let descriptor = SearchDescriptor::builder("User")
            .searchable("fullName")
            .default_search_column("fullName")
            .alias("email", "fullName")
            .build();

        assert_eq!(
            builder().descriptor(descriptor).unwrap_err(),
            DescriptorError::AliasShadowsField {
                entity: "User".to_owned(),
                alias: "email".to_owned(),
            }
        );
    }

    #[test]
    fn collection_join_requires_distinct() {
        let descriptor = SearchDescriptor::builder("User")
            .searchable("fullName")
            .searchable("companies.companyName")
            .default_search_column("fullName")
            .build();

        assert_eq!(
            builder().descriptor(descriptor).unwrap_err(),
            DescriptorError::DistinctRequired {
                entity: "User".to_owned()
            }
        );
    }

    #[test]
    fn subquery_field_needs_no_distinct() {
        let descriptor = SearchDescriptor::builder("User")
            .searchable("fullName")
            .default_search_column("fullName")
            .subquery_field(
                "companies.companyName",
                SubquerySpec::new(
                    "EXISTS (SELECT 1 FROM company_users cu JOIN companies c \
                     ON c.id = cu.company_id WHERE cu.user_id = e.id \
                     AND LOWER(c.company_name) LIKE LOWER(CONCAT('%', :{param}, '%')))",
                ),
            )
            .build();

        assert!(builder().descriptor(descriptor).is_ok());
    }

    #[test]
    fn fetch_join_conflicting_with_subquery_fails() {
        let descriptor = SearchDescriptor::builder("User")
            .searchable("fullName")
            .default_search_column("fullName")
            .use_distinct()
            .fetch_join("companies")
            .subquery_field(
                "companies.companyName",
                SubquerySpec::new("EXISTS (SELECT 1 WHERE :{param} = :{param})"),
            )
            .build();

        assert_eq!(
            builder().descriptor(descriptor).unwrap_err(),
            DescriptorError::FetchJoinConflictsWithSubquery {
                entity: "User".to_owned(),
                path: "companies.companyName".to_owned(),
            }
        );
    }

    #[test]
    fn sorting_on_subquery_field_fails() {
        let descriptor = SearchDescriptor::builder("User")
            .searchable("fullName")
            .default_search_column("fullName")
            .sortable("companies.companyName")
            .subquery_field(
                "companies.companyName",
                SubquerySpec::new("EXISTS (SELECT 1 WHERE :{param} = :{param})"),
            )
            .build();

        assert_eq!(
            builder().descriptor(descriptor).unwrap_err(),
            DescriptorError::SortableSubqueryField {
                entity: "User".to_owned(),
                path: "companies.companyName".to_owned(),
            }
        );
    }

    #[test]
    fn duplicate_registration_fails() {
        let result = builder()
            .descriptor(user_descriptor())
            .unwrap()
            .descriptor(user_descriptor());

        assert_eq!(
            result.unwrap_err(),
            DescriptorError::DuplicateDescriptor {
                entity: "User".to_owned()
            }
        );
    }
}
