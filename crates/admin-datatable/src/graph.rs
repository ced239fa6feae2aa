// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Declarative entity field graphs
//!
//! Each entity declares its table, primary key, scalar fields and relations
//! once. Dotted paths in descriptors and requests are resolved against this
//! graph one segment at a time; a path that leaves the declared graph does
//! not resolve. This replaces runtime reflection: the graph is the complete
//! set of columns and associations a query may ever touch.

use rustc_hash::FxHashMap;

use crate::error::DescriptorError;
use crate::field_type::FieldType;

/// A scalar field of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// The column name in the entity's table
    pub column: &'static str,
    pub field_type: FieldType,
}

/// How a relation is reached from its owning entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// The owning table carries a foreign key to the target's primary key
    ManyToOne { local_column: &'static str },
    /// The target table carries a foreign key back to the owner
    OneToMany { remote_column: &'static str },
    /// Owner and target are linked through a junction table
    ManyToMany {
        junction_table: &'static str,
        junction_local: &'static str,
        junction_remote: &'static str,
    },
}

impl RelationKind {
    /// Whether traversing this relation can fan out to multiple rows
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::OneToMany { .. } | Self::ManyToMany { .. })
    }
}

/// A named association to another entity in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationDef {
    /// Name of the target entity
    pub target: &'static str,
    pub kind: RelationKind,
}

/// The declared structure of one entity
#[derive(Debug, Clone)]
pub struct EntityGraph {
    entity: &'static str,
    table: &'static str,
    primary_key: &'static str,
    fields: FxHashMap<&'static str, FieldDef>,
    relations: FxHashMap<&'static str, RelationDef>,
}

impl EntityGraph {
    pub fn new(entity: &'static str, table: &'static str, primary_key: &'static str) -> Self {
        Self {
            entity,
            table,
            primary_key,
            fields: FxHashMap::default(),
            relations: FxHashMap::default(),
        }
    }

    pub fn field(mut self, name: &'static str, column: &'static str, field_type: FieldType) -> Self {
        self.fields.insert(name, FieldDef { column, field_type });
        self
    }

    pub fn many_to_one(
        mut self,
        name: &'static str,
        target: &'static str,
        local_column: &'static str,
    ) -> Self {
        self.relations.insert(
            name,
            RelationDef {
                target,
                kind: RelationKind::ManyToOne { local_column },
            },
        );
        self
    }

    pub fn one_to_many(
        mut self,
        name: &'static str,
        target: &'static str,
        remote_column: &'static str,
    ) -> Self {
        self.relations.insert(
            name,
            RelationDef {
                target,
                kind: RelationKind::OneToMany { remote_column },
            },
        );
        self
    }

    pub fn many_to_many(
        mut self,
        name: &'static str,
        target: &'static str,
        junction_table: &'static str,
        junction_local: &'static str,
        junction_remote: &'static str,
    ) -> Self {
        self.relations.insert(
            name,
            RelationDef {
                target,
                kind: RelationKind::ManyToMany {
                    junction_table,
                    junction_local,
                    junction_remote,
                },
            },
        );
        self
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn primary_key(&self) -> &'static str {
        self.primary_key
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.get(name)
    }

    /// Whether `name` names a scalar field of this entity
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }
}

/// One traversed relation hop of a resolved path
#[derive(Debug, Clone)]
pub struct RelationStep<'g> {
    /// The relation name as referenced in the path
    pub name: String,
    pub relation: &'g RelationDef,
    /// The graph of the relation's target entity
    pub target: &'g EntityGraph,
}

/// A dotted path resolved against the entity graph
#[derive(Debug, Clone)]
pub struct ResolvedPath<'g> {
    /// The canonical dotted path
    pub path: String,
    /// Relation hops leading to the terminal field, outermost first
    pub steps: Vec<RelationStep<'g>>,
    pub field: FieldDef,
}

impl ResolvedPath<'_> {
    /// Whether any traversed relation is collection valued
    pub fn is_collection(&self) -> bool {
        self.steps.iter().any(|step| step.relation.kind.is_collection())
    }

    /// The relation prefix of the path, empty for root fields
    pub fn relation_path(&self) -> String {
        self.steps
            .iter()
            .map(|step| step.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// The SQL alias of the table holding the terminal field
    pub fn table_alias(&self, root_alias: &str) -> String {
        match self.steps.last() {
            None => root_alias.to_owned(),
            Some(_) => relation_alias(&self.relation_path()),
        }
    }

    /// The qualified SQL expression for the terminal column
    pub fn column_expr(&self, root_alias: &str) -> String {
        format!("{}.{}", self.table_alias(root_alias), self.field.column)
    }
}

/// Deterministic SQL alias for a relation path (`role.privileges` -> `role_privileges_`)
pub(crate) fn relation_alias(relation_path: &str) -> String {
    let mut alias = relation_path.replace('.', "_");
    alias.push('_');
    alias
}

/// Alias of the junction table backing a many-to-many relation path
pub(crate) fn junction_alias(relation_path: &str) -> String {
    let mut alias = relation_path.replace('.', "_");
    alias.push_str("_jn_");
    alias
}

/// Registry of all declared entity graphs
#[derive(Debug, Clone, Default)]
pub struct GraphRegistry {
    graphs: FxHashMap<&'static str, EntityGraph>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, graph: EntityGraph) {
        self.graphs.insert(graph.entity(), graph);
    }

    pub fn get(&self, entity: &str) -> Option<&EntityGraph> {
        self.graphs.get(entity)
    }

    /// Resolve a dotted path starting at `entity`
    ///
    /// Walks one segment at a time; every intermediate segment must be a
    /// declared relation and the terminal segment a declared scalar field.
    pub fn resolve_path<'g>(
        &'g self,
        entity: &str,
        path: &str,
    ) -> Result<ResolvedPath<'g>, DescriptorError> {
        let mut graph = self
            .get(entity)
            .ok_or_else(|| DescriptorError::UnknownEntity {
                entity: entity.to_owned(),
            })?;

        let mut steps = Vec::new();
        let segments: Vec<&str> = path.split('.').collect();

        for (idx, segment) in segments.iter().enumerate() {
            let is_last = idx == segments.len() - 1;

            if is_last {
                if let Some(field) = graph.field_def(segment) {
                    return Ok(ResolvedPath {
                        path: path.to_owned(),
                        steps,
                        field: *field,
                    });
                }
            } else if let Some(relation) = graph.relation(segment) {
                let target = self.get(relation.target).ok_or_else(|| {
                    DescriptorError::UnknownEntity {
                        entity: relation.target.to_owned(),
                    }
                })?;

                steps.push(RelationStep {
                    name: segment.to_string(),
                    relation,
                    target,
                });
                graph = target;
                continue;
            }

            return Err(DescriptorError::UnresolvablePath {
                entity: entity.to_owned(),
                path: path.to_owned(),
                segment: segment.to_string(),
            });
        }

        // An empty path never reaches this point: `split` yields at least one segment
        Err(DescriptorError::UnresolvablePath {
            entity: entity.to_owned(),
            path: path.to_owned(),
            segment: String::new(),
        })
    }

    /// Resolve a pure relation path (no terminal field), as used by fetch joins
    pub fn resolve_relation<'g>(
        &'g self,
        entity: &str,
        relation_path: &str,
    ) -> Result<Vec<RelationStep<'g>>, DescriptorError> {
        let mut graph = self
            .get(entity)
            .ok_or_else(|| DescriptorError::UnknownEntity {
                entity: entity.to_owned(),
            })?;

        let mut steps = Vec::new();

        for segment in relation_path.split('.') {
            let relation =
                graph
                    .relation(segment)
                    .ok_or_else(|| DescriptorError::UnresolvablePath {
                        entity: entity.to_owned(),
                        path: relation_path.to_owned(),
                        segment: segment.to_owned(),
                    })?;

            let target = self
                .get(relation.target)
                .ok_or_else(|| DescriptorError::UnknownEntity {
                    entity: relation.target.to_owned(),
                })?;

            steps.push(RelationStep {
                name: segment.to_owned(),
                relation,
                target,
            });
            graph = target;
        }

        Ok(steps)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn registry() -> GraphRegistry {
        let mut registry = GraphRegistry::new();
        registry.insert(
            EntityGraph::new("User", "users", "id")
                .field("fullName", "full_name", FieldType::Text)
                .field("email", "email", FieldType::Text)
                .many_to_one("role", "Role", "role_id")
                .many_to_many("companies", "Company", "company_users", "user_id", "company_id"),
        );
        registry.insert(
            EntityGraph::new("Role", "roles", "id").field("name", "name", FieldType::Text),
        );
        registry.insert(
            EntityGraph::new("Company", "companies", "id").field(
                "companyName",
                "company_name",
                FieldType::Text,
            ),
        );
        registry
    }

    #[test]
    fn resolves_root_field() {
        let registry = registry();
        let resolved = registry.resolve_path("User", "fullName").unwrap();

        assert!(resolved.steps.is_empty());
        assert_eq!(resolved.column_expr("e"), "e.full_name");
        assert!(!resolved.is_collection());
    }

    #[test]
    fn resolves_relation_field() {
        let registry = registry();
        let resolved = registry.resolve_path("User", "role.name").unwrap();

        assert_eq!(resolved.steps.len(), 1);
        assert_eq!(resolved.column_expr("e"), "role_.name");
        assert_eq!(resolved.relation_path(), "role");
        assert!(!resolved.is_collection());
    }

    #[test]
    fn collection_path_is_detected() {
        let registry = registry();
        let resolved = registry.resolve_path("User", "companies.companyName").unwrap();

        assert!(resolved.is_collection());
        assert_eq!(resolved.column_expr("e"), "companies_.company_name");
    }

    #[test]
    fn unresolvable_paths_are_rejected() {
        let registry = registry();

        // outside the declared graph, not reachable by the structural walk
        assert!(registry.resolve_path("User", "role.internals").is_err());
        assert!(registry.resolve_path("User", "passwordHash").is_err());
        assert!(registry.resolve_path("Unknown", "fullName").is_err());
    }
}
