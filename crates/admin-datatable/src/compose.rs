// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Query composition
//!
//! Turns a [`SearchDescriptor`] and a [`DataTableRequest`] into an
//! [`ExecutionPlan`]: a parameterized data query plus the matching count
//! query. Composition validates every referenced column against the
//! descriptor first; unknown fields and sorts on unsortable paths reject the
//! request. Recoverable problems inside a filter value (unparseable date,
//! failed numeric coercion, wrong `dbetween` arity) drop the affected
//! predicate with a warning instead.

use rustc_hash::FxHashSet;

use opentalk_admin_types_api_v1::error::{
    ValidationErrorEntry, ERROR_CODE_INVALID_FILTER, ERROR_CODE_NOT_SORTABLE,
    ERROR_CODE_UNKNOWN_FIELD,
};
use opentalk_admin_types_api_v1::{DataTableRequest, SortDirection};

use crate::bind::BindValue;
use crate::descriptor::{SearchDescriptor, SubquerySpec};
use crate::error::SearchError;
use crate::filter::{FilterCriteria, FilterOperator};
use crate::graph::{junction_alias, relation_alias, EntityGraph, GraphRegistry, RelationKind, ResolvedPath};
use crate::plan::{ExecutionPlan, Join};
use crate::registry::SearchRegistry;
use crate::{dates, SortField};

/// Alias of the root entity in every composed query
const ROOT_ALIAS: &str = "e";

/// Shared bind parameter of the global search block
const SEARCH_PARAM: &str = "search_text";

/// Composes data-table requests into executable plans
#[derive(Debug, Clone, Copy)]
pub struct QueryComposer<'r> {
    registry: &'r SearchRegistry,
}

impl<'r> QueryComposer<'r> {
    pub fn new(registry: &'r SearchRegistry) -> Self {
        Self { registry }
    }

    /// Compose the data and count query for `entity` from scratch
    #[tracing::instrument(skip_all, fields(entity = entity))]
    pub fn compose(
        &self,
        entity: &str,
        request: &DataTableRequest,
    ) -> Result<ExecutionPlan, SearchError> {
        let mut composition = Composition::start(self.registry, entity, request)?;

        for relation_path in composition.descriptor.fetch_joins.clone() {
            composition.add_fetch_join(&relation_path)?;
        }

        composition.global_search(request);
        composition.column_filters();
        composition.order_by();

        composition.finish(request)
    }

    /// Extend a preformed base query with search, filters, order and
    /// pagination
    ///
    /// The base query must already contain its joins; any `ORDER BY` it
    /// carries is stripped. The additional WHERE block is spliced with
    /// `AND (...)` when the base already filters, the count form swaps the
    /// base projection for `COUNT(*)`.
    #[tracing::instrument(skip_all, fields(entity = entity))]
    pub fn compose_with_base(
        &self,
        entity: &str,
        base_sql: &str,
        request: &DataTableRequest,
    ) -> Result<ExecutionPlan, SearchError> {
        let mut composition = Composition::start(self.registry, entity, request)?;
        composition.base_mode = true;

        composition.global_search(request);
        composition.column_filters();
        composition.order_by();

        composition.finish_with_base(base_sql, request)
    }
}

/// One validated, alias-resolved request column
struct ResolvedColumn<'g> {
    /// The client-facing name as sent in the request
    client_name: String,
    resolved: ResolvedPath<'g>,
    field_type: crate::FieldType,
    subquery: Option<SubquerySpec>,
    filter: Option<FilterCriteria>,
    sort: Option<SortDirection>,
}

impl ResolvedColumn<'_> {
    fn column_expr(&self) -> String {
        self.resolved.column_expr(ROOT_ALIAS)
    }
}

struct Composition<'g> {
    graphs: &'g GraphRegistry,
    descriptor: &'g SearchDescriptor,
    graph: &'g EntityGraph,
    base_mode: bool,
    columns: Vec<ResolvedColumn<'g>>,
    search_set: Vec<ResolvedColumn<'g>>,
    joins: Vec<Join>,
    predicates: Vec<String>,
    binds: Vec<(String, BindValue)>,
    order_by: Vec<String>,
    used_params: FxHashSet<String>,
}

impl<'g> Composition<'g> {
    fn start(
        registry: &'g SearchRegistry,
        entity: &str,
        request: &DataTableRequest,
    ) -> Result<Self, SearchError> {
        let descriptor = registry.descriptor(entity)?;
        let graphs = registry.graphs();
        let graph = graphs
            .get(entity)
            .ok_or_else(|| SearchError::InvariantViolation {
                message: format!("registered descriptor for `{entity}` has no entity graph"),
            })?;

        let mut composition = Self {
            graphs,
            descriptor,
            graph,
            base_mode: false,
            columns: Vec::new(),
            search_set: Vec::new(),
            joins: Vec::new(),
            predicates: Vec::new(),
            binds: Vec::new(),
            order_by: Vec::new(),
            used_params: FxHashSet::default(),
        };

        composition.resolve_request(request)?;
        Ok(composition)
    }

    /// Validate and alias-resolve every referenced column
    ///
    /// Unknown fields, malformed filter grammar and sorts on unsortable
    /// paths are collected and rejected together.
    fn resolve_request(&mut self, request: &DataTableRequest) -> Result<(), SearchError> {
        let mut entries = Vec::new();

        for column in &request.columns {
            let filter = match &column.filter {
                Some(filter) => match filter.parse::<FilterCriteria>() {
                    Ok(criteria) => Some(criteria),
                    Err(error) => {
                        entries.push(ValidationErrorEntry::new(
                            column.column_name.clone(),
                            filter.as_str(),
                            ERROR_CODE_INVALID_FILTER,
                            Some(error.to_string()),
                        ));
                        continue;
                    }
                },
                None => None,
            };

            match self.resolve_column(&column.column_name) {
                Ok(mut resolved) => {
                    if let Some(sort) = column.sort {
                        let path = resolved.resolved.path.clone();
                        if self.descriptor.is_sortable(&path) {
                            resolved.sort = Some(sort);
                        } else {
                            entries.push(ValidationErrorEntry::new(
                                column.column_name.clone(),
                                path.as_str(),
                                ERROR_CODE_NOT_SORTABLE,
                                Some(format!("field `{path}` is not sortable")),
                            ));
                        }
                    }

                    resolved.filter = filter;
                    self.columns.push(resolved);
                }
                Err(entry) => entries.push(entry),
            }
        }

        let search_names: Vec<String> = match request.search_columns() {
            Some(explicit) => explicit.to_vec(),
            None => self.descriptor.default_search_columns.clone(),
        };

        for name in search_names {
            match self.resolve_column(&name) {
                Ok(resolved) => self.search_set.push(resolved),
                Err(entry) => entries.push(entry),
            }
        }

        if entries.is_empty() {
            Ok(())
        } else {
            Err(SearchError::validation(entries))
        }
    }

    fn resolve_column(&self, client_name: &str) -> Result<ResolvedColumn<'g>, ValidationErrorEntry> {
        let path = self.descriptor.resolve_alias(client_name).to_owned();

        let subquery = self.descriptor.subquery(&path).cloned();

        if subquery.is_none() && !self.descriptor.is_searchable(&path) {
            return Err(ValidationErrorEntry::new(
                client_name.to_owned(),
                path.as_str(),
                ERROR_CODE_UNKNOWN_FIELD,
                Some(format!("unknown column `{client_name}`")),
            ));
        }

        let resolved = self
            .graphs
            .resolve_path(self.graph.entity(), &path)
            .map_err(|_| {
                ValidationErrorEntry::new(
                    client_name.to_owned(),
                    path.as_str(),
                    ERROR_CODE_UNKNOWN_FIELD,
                    Some(format!("unknown column `{client_name}`")),
                )
            })?;

        let field_type = self
            .descriptor
            .field_type_override(&path)
            .unwrap_or(resolved.field.field_type);

        Ok(ResolvedColumn {
            client_name: client_name.to_owned(),
            resolved,
            field_type,
            subquery,
            filter: None,
            sort: None,
        })
    }

    /// Emit the eager join for a declared fetch-join association
    fn add_fetch_join(&mut self, relation_path: &str) -> Result<(), SearchError> {
        let steps =
            self.graphs
                .resolve_relation(self.graph.entity(), relation_path)
                .map_err(|error| SearchError::InvariantViolation {
                    message: error.to_string(),
                })?;

        let mut prefix = String::new();
        let mut parent_graph = self.graph;
        let mut parent_alias = ROOT_ALIAS.to_owned();

        for step in steps {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(&step.name);

            let fetch = prefix == relation_path;
            self.ensure_join_step(&prefix, parent_graph, &parent_alias, step.relation.kind, step.target, fetch, false);

            parent_alias = relation_alias(&prefix);
            parent_graph = step.target;
        }

        Ok(())
    }

    /// Make sure every relation hop of `resolved` is joined
    fn ensure_joins_for(&mut self, resolved: &ResolvedPath<'g>, required_for_filter: bool) {
        if self.base_mode {
            // the base query carries its own joins
            return;
        }

        let mut prefix = String::new();
        let mut parent_graph = self.graph;
        let mut parent_alias = ROOT_ALIAS.to_owned();

        for step in &resolved.steps {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(&step.name);

            self.ensure_join_step(
                &prefix,
                parent_graph,
                &parent_alias,
                step.relation.kind,
                step.target,
                false,
                required_for_filter,
            );

            parent_alias = relation_alias(&prefix);
            parent_graph = step.target;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn ensure_join_step(
        &mut self,
        relation_path: &str,
        parent_graph: &EntityGraph,
        parent_alias: &str,
        kind: RelationKind,
        target: &EntityGraph,
        fetch: bool,
        required_for_filter: bool,
    ) {
        if let Some(existing) = self
            .joins
            .iter_mut()
            .find(|join| join.relation_path == relation_path)
        {
            existing.fetch |= fetch;
            existing.required_for_filter |= required_for_filter;
            return;
        }

        let alias = relation_alias(relation_path);

        let sql = match kind {
            RelationKind::ManyToOne { local_column } => format!(
                "LEFT JOIN {} {} ON {}.{} = {}.{}",
                target.table(),
                alias,
                alias,
                target.primary_key(),
                parent_alias,
                local_column,
            ),
            RelationKind::OneToMany { remote_column } => format!(
                "LEFT JOIN {} {} ON {}.{} = {}.{}",
                target.table(),
                alias,
                alias,
                remote_column,
                parent_alias,
                parent_graph.primary_key(),
            ),
            RelationKind::ManyToMany {
                junction_table,
                junction_local,
                junction_remote,
            } => {
                let junction = junction_alias(relation_path);
                format!(
                    "LEFT JOIN {junction_table} {junction} ON {junction}.{junction_local} = {parent_alias}.{parent_pk} \
                     LEFT JOIN {target_table} {alias} ON {alias}.{target_pk} = {junction}.{junction_remote}",
                    parent_pk = parent_graph.primary_key(),
                    target_table = target.table(),
                    target_pk = target.primary_key(),
                )
            }
        };

        self.joins.push(Join {
            relation_path: relation_path.to_owned(),
            sql,
            fetch,
            required_for_filter,
            collection: kind.is_collection(),
        });
    }

    /// Compile the OR block of the global search
    fn global_search(&mut self, request: &DataTableRequest) {
        let Some(text) = request.search_text() else {
            return;
        };

        let mut parts = Vec::new();

        let search_set = std::mem::take(&mut self.search_set);

        for column in &search_set {
            match &column.subquery {
                Some(spec) => parts.push(spec.render(SEARCH_PARAM)),
                None => {
                    self.ensure_joins_for(&column.resolved, true);

                    let col = column.column_expr();
                    if column.field_type.is_textual() {
                        parts.push(format!(
                            "LOWER({col}) LIKE LOWER(CONCAT('%', :{SEARCH_PARAM}, '%'))"
                        ));
                    } else {
                        parts.push(format!(
                            "CONCAT('', {col}) LIKE CONCAT('%', :{SEARCH_PARAM}, '%')"
                        ));
                    }
                }
            }
        }

        self.search_set = search_set;

        if parts.is_empty() {
            return;
        }

        let block = if parts.len() == 1 {
            parts.remove(0)
        } else {
            format!("({})", parts.join(" OR "))
        };

        self.predicates.push(block);
        self.binds
            .push((SEARCH_PARAM.to_owned(), BindValue::Text(text.to_owned())));
    }

    /// Compile every column filter
    ///
    /// Predicate and bind parameters are emitted as a pair; a dropped
    /// predicate never leaves its binds behind.
    fn column_filters(&mut self) {
        let columns = std::mem::take(&mut self.columns);

        for column in &columns {
            let Some(criteria) = &column.filter else {
                continue;
            };

            let param_base = self.unique_param(&column.resolved.path);

            let compiled = match &column.subquery {
                Some(spec) => compile_subquery_filter(spec, criteria, &param_base),
                None => compile_filter(&column.column_expr(), column.field_type, criteria, &param_base),
            };

            let Some((predicate, binds)) = compiled else {
                log::warn!(
                    "Dropping filter `{criteria}` on column `{}`: value does not fit the field",
                    column.client_name,
                );
                continue;
            };

            if column.subquery.is_none() {
                self.ensure_joins_for(&column.resolved, true);
            }

            self.predicates.push(predicate);
            self.binds.extend(binds);
        }

        self.columns = columns;
    }

    /// Reserve a unique bind parameter base name for a filtered path
    fn unique_param(&mut self, path: &str) -> String {
        let base = format!("filter_{}", path.replace('.', "_"));

        let mut candidate = base.clone();
        let mut counter = 1;
        while self.used_params.contains(&candidate) {
            counter += 1;
            candidate = format!("{base}_{counter}");
        }

        self.used_params.insert(candidate.clone());
        candidate
    }

    /// Assemble ORDER BY from request sorts, default sorts or the primary key
    fn order_by(&mut self) {
        let requested: Vec<(ResolvedPath<'g>, SortDirection)> = self
            .columns
            .iter()
            .filter_map(|column| column.sort.map(|sort| (column.resolved.clone(), sort)))
            .collect();

        if !requested.is_empty() {
            for (resolved, direction) in requested {
                self.ensure_joins_for(&resolved, false);
                self.order_by
                    .push(format!("{} {direction}", resolved.column_expr(ROOT_ALIAS)));
            }
            return;
        }

        if !self.descriptor.default_sort_fields.is_empty() {
            if let Some(entries) = self.resolve_default_sort() {
                for (resolved, direction) in entries {
                    self.ensure_joins_for(&resolved, false);
                    self.order_by
                        .push(format!("{} {direction}", resolved.column_expr(ROOT_ALIAS)));
                }
                return;
            }

            log::warn!(
                "Default sort of `{}` does not resolve, falling back to the primary key",
                self.descriptor.entity(),
            );
        }

        self.order_by
            .push(format!("{ROOT_ALIAS}.{} ASC", self.graph.primary_key()));
    }

    /// The declared default sort, if every entry resolves and is sortable
    ///
    /// Duplicate fields are honored in declaration order, first one wins.
    fn resolve_default_sort(&self) -> Option<Vec<(ResolvedPath<'g>, SortDirection)>> {
        let mut seen = FxHashSet::default();
        let mut entries = Vec::new();

        for SortField { path, direction } in &self.descriptor.default_sort_fields {
            if !seen.insert(path.as_str()) {
                continue;
            }

            if !self.descriptor.is_sortable(path) {
                return None;
            }

            let resolved = self.graphs.resolve_path(self.graph.entity(), path).ok()?;
            entries.push((resolved, *direction));
        }

        Some(entries)
    }

    fn where_clause(&self) -> String {
        if self.predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.predicates.join(" AND "))
        }
    }

    fn finish(mut self, request: &DataTableRequest) -> Result<ExecutionPlan, SearchError> {
        let distinct = self.descriptor.use_distinct();

        let select = if distinct {
            format!("SELECT DISTINCT {ROOT_ALIAS}.*")
        } else {
            format!("SELECT {ROOT_ALIAS}.*")
        };

        let join_sql: String = self
            .joins
            .iter()
            .map(|join| format!(" {}", join.sql))
            .collect();

        let count_join_sql: String = self
            .joins
            .iter()
            .filter(|join| join.required_for_filter)
            .map(|join| format!(" {}", join.sql))
            .collect();

        let where_clause = self.where_clause();

        let sql = format!(
            "{select} FROM {table} {ROOT_ALIAS}{join_sql}{where_clause} ORDER BY {order} LIMIT :limit OFFSET :offset",
            table = self.graph.table(),
            order = self.order_by.join(", "),
        );

        let count_projection = if distinct {
            format!("COUNT(DISTINCT {ROOT_ALIAS}.{})", self.graph.primary_key())
        } else {
            "COUNT(*)".to_owned()
        };

        let count_sql = format!(
            "SELECT {count_projection} AS total FROM {table} {ROOT_ALIAS}{count_join_sql}{where_clause}",
            table = self.graph.table(),
        );

        let pagination = request.pagination;
        self.binds
            .push(("limit".to_owned(), BindValue::Long(pagination.size)));
        self.binds
            .push(("offset".to_owned(), BindValue::Long(pagination.offset())));

        let plan = ExecutionPlan {
            sql,
            count_sql,
            binds: self.binds,
            joins: self.joins,
        };

        plan.validate_binds()?;
        Ok(plan)
    }

    fn finish_with_base(
        mut self,
        base_sql: &str,
        request: &DataTableRequest,
    ) -> Result<ExecutionPlan, SearchError> {
        let base = strip_order_by(base_sql).trim_end().to_owned();

        let extra_where = if self.predicates.is_empty() {
            String::new()
        } else {
            let block = self.predicates.join(" AND ");
            if has_top_level_keyword(&base, "WHERE") {
                format!(" AND ({block})")
            } else {
                format!(" WHERE ({block})")
            }
        };

        let sql = format!(
            "{base}{extra_where} ORDER BY {order} LIMIT :limit OFFSET :offset",
            order = self.order_by.join(", "),
        );

        let from_offset =
            top_level_keyword_offset(&base, "FROM").ok_or_else(|| SearchError::InvariantViolation {
                message: "base query has no top-level FROM clause".to_owned(),
            })?;

        let count_sql = format!(
            "SELECT COUNT(*) AS total {}{extra_where}",
            &base[from_offset..],
        );

        let pagination = request.pagination;
        self.binds
            .push(("limit".to_owned(), BindValue::Long(pagination.size)));
        self.binds
            .push(("offset".to_owned(), BindValue::Long(pagination.offset())));

        let plan = ExecutionPlan {
            sql,
            count_sql,
            binds: self.binds,
            joins: Vec::new(),
        };

        plan.validate_binds()?;
        Ok(plan)
    }
}

/// Compile a filter on a subquery field
///
/// The descriptor's `EXISTS` template defines the predicate shape; the
/// filter contributes the bind value. Operators that need more than a
/// single value do not fit a subquery template and drop the predicate.
fn compile_subquery_filter(
    spec: &SubquerySpec,
    criteria: &FilterCriteria,
    param: &str,
) -> Option<(String, Vec<(String, BindValue)>)> {
    if criteria.operator.is_nullary() || criteria.values.is_empty() {
        return None;
    }

    let value = criteria.values.join(",");
    Some((
        spec.render(param),
        vec![(param.to_owned(), BindValue::Text(value))],
    ))
}

/// Compile one column filter into a predicate and its binds
///
/// Returns [`None`] when the filter cannot be applied (failed coercion,
/// unparseable date, wrong arity); the caller logs and drops it.
fn compile_filter(
    col: &str,
    field_type: crate::FieldType,
    criteria: &FilterCriteria,
    param: &str,
) -> Option<(String, Vec<(String, BindValue)>)> {
    use FilterOperator::*;

    let single = || criteria.values.join(",");

    match criteria.operator {
        Cnt | Ncnt | Sw | Ew => {
            let value = single();
            let pattern = match criteria.operator {
                Cnt | Ncnt => format!("CONCAT('%', :{param}, '%')"),
                Sw => format!("CONCAT(:{param}, '%')"),
                Ew => format!("CONCAT('%', :{param})"),
                _ => unreachable!(),
            };
            let verb = if criteria.operator == Ncnt {
                "NOT LIKE"
            } else {
                "LIKE"
            };

            let predicate = if field_type.is_textual() {
                format!("LOWER({col}) {verb} LOWER({pattern})")
            } else {
                format!("CONCAT('', {col}) {verb} {pattern}")
            };

            Some((predicate, vec![(param.to_owned(), BindValue::Text(value))]))
        }

        Eq | Ne => {
            let value = single();
            let operator = if criteria.operator == Eq { "=" } else { "<>" };

            match BindValue::coerce(&value, field_type) {
                Ok(bind) => Some((
                    format!("{col} {operator} :{param}"),
                    vec![(param.to_owned(), bind)],
                )),
                // textual coercion never fails; for other types the
                // predicate is dropped
                Err(_) => None,
            }
        }

        Gt | Gte | Lt | Lte => {
            let value = single();
            let operator = match criteria.operator {
                Gt => ">",
                Gte => ">=",
                Lt => "<",
                Lte => "<=",
                _ => unreachable!(),
            };

            let bind = BindValue::coerce(&value, field_type).ok()?;
            Some((
                format!("{col} {operator} :{param}"),
                vec![(param.to_owned(), bind)],
            ))
        }

        Deq | Dne | Dgt | Dgte | Dlt | Dlte => {
            let operator = match criteria.operator {
                Deq => "=",
                Dne => "<>",
                Dgt => ">",
                Dgte => ">=",
                Dlt => "<",
                Dlte => "<=",
                _ => unreachable!(),
            };

            let date = dates::parse_date(&single())?;
            Some((
                format!("DATE({col}) {operator} :{param}"),
                vec![(param.to_owned(), BindValue::Date(date))],
            ))
        }

        Dbetween => {
            let [start, end] = criteria.values.as_slice() else {
                return None;
            };

            let start = dates::parse_date(start)?;
            let end = dates::parse_date(end)?;

            Some((
                format!("DATE({col}) BETWEEN :{param}_start AND :{param}_end"),
                vec![
                    (format!("{param}_start"), BindValue::Date(start)),
                    (format!("{param}_end"), BindValue::Date(end)),
                ],
            ))
        }

        In => {
            let values: Vec<&str> = criteria
                .values
                .iter()
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .collect();

            if values.is_empty() {
                return Some(("1 = 0".to_owned(), Vec::new()));
            }

            let mut binds = Vec::with_capacity(values.len());
            for value in values {
                binds.push(BindValue::coerce(value, field_type).ok()?);
            }

            Some((
                format!("{col} IN (:{param})"),
                vec![(param.to_owned(), BindValue::List(binds))],
            ))
        }

        Notnull => Some((format!("{col} IS NOT NULL"), Vec::new())),
        Isnull => Some((format!("{col} IS NULL"), Vec::new())),
    }
}

/// Strip a trailing top-level `ORDER BY` clause from a preformed query
fn strip_order_by(sql: &str) -> &str {
    match top_level_keyword_offset(sql, "ORDER BY") {
        Some(offset) => &sql[..offset],
        None => sql,
    }
}

fn has_top_level_keyword(sql: &str, keyword: &str) -> bool {
    top_level_keyword_offset(sql, keyword).is_some()
}

/// Byte offset of the first top-level (not parenthesized) occurrence of `keyword`
fn top_level_keyword_offset(sql: &str, keyword: &str) -> Option<usize> {
    let haystack = sql.as_bytes();
    let needle = keyword.as_bytes();

    let mut depth = 0usize;

    for index in 0..haystack.len() {
        match haystack[index] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => {
                let candidate = &haystack[index..];
                if candidate.len() < needle.len()
                    || !candidate[..needle.len()].eq_ignore_ascii_case(needle)
                {
                    continue;
                }

                // keyword must stand on word boundaries
                let before_ok = index == 0 || !haystack[index - 1].is_ascii_alphanumeric();
                let after = index + needle.len();
                let after_ok =
                    after >= haystack.len() || !haystack[after].is_ascii_alphanumeric();

                if before_ok && after_ok {
                    return Some(index);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod test {
    use opentalk_admin_types_api_v1::{Pagination, SearchFilter, TableColumn};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{EntityGraph, FieldType, SearchRegistryBuilder};

    fn registry() -> SearchRegistry {
        SearchRegistryBuilder::new()
            .graph(
                EntityGraph::new("User", "users", "id")
                    .field("id", "id", FieldType::Long)
                    .field("fullName", "full_name", FieldType::Text)
                    .field("email", "email", FieldType::Text)
                    .field("createdOn", "created_on", FieldType::Timestamp)
                    .field("isActive", "is_active", FieldType::BoolAsInt)
                    .field("status", "status", FieldType::Enum)
                    .field("loginCount", "login_count", FieldType::Long)
                    .many_to_one("role", "Role", "role_id")
                    .many_to_many("companies", "Company", "company_users", "user_id", "company_id"),
            )
            .graph(
                EntityGraph::new("Role", "roles", "id")
                    .field("id", "id", FieldType::Long)
                    .field("name", "name", FieldType::Text),
            )
            .graph(
                EntityGraph::new("Company", "companies", "id")
                    .field("id", "id", FieldType::Long)
                    .field("companyName", "company_name", FieldType::Text),
            )
            .descriptor(
                SearchDescriptor::builder("User")
                    .searchable("fullName")
                    .searchable("email")
                    .searchable("role.name")
                    .searchable("createdOn")
                    .searchable("isActive")
                    .searchable("status")
                    .searchable("loginCount")
                    .sortable("fullName")
                    .sortable("email")
                    .default_search_column("fullName")
                    .default_search_column("email")
                    .default_sort("fullName", SortDirection::Asc)
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
                    .build(),
            )
            .unwrap()
            .build()
    }

    fn request() -> DataTableRequest {
        DataTableRequest {
            pagination: Pagination { page: 0, size: 10 },
            search_filter: None,
            columns: Vec::new(),
        }
    }

    fn search_request(text: &str) -> DataTableRequest {
        DataTableRequest {
            search_filter: Some(SearchFilter {
                search_text: Some(text.to_owned()),
                columns: None,
            }),
            ..request()
        }
    }

    #[test]
    fn global_search_over_default_columns() {
        let registry = registry();
        let plan = QueryComposer::new(&registry)
            .compose("User", &search_request("ali"))
            .unwrap();

        assert_eq!(
            plan.sql(),
            "SELECT e.* FROM users e \
             LEFT JOIN roles role_ ON role_.id = e.role_id \
             WHERE (LOWER(e.full_name) LIKE LOWER(CONCAT('%', :search_text, '%')) \
             OR LOWER(e.email) LIKE LOWER(CONCAT('%', :search_text, '%'))) \
             ORDER BY e.full_name ASC LIMIT :limit OFFSET :offset"
        );
        assert_eq!(
            plan.bind("search_text"),
            Some(&BindValue::Text("ali".to_owned()))
        );
        assert_eq!(plan.bind("limit"), Some(&BindValue::Long(10)));
        assert_eq!(plan.bind("offset"), Some(&BindValue::Long(0)));

        // the fetch join is eager in the data query and dropped in the count
        let fetch: Vec<_> = plan.fetch_joins().collect();
        assert_eq!(fetch.len(), 1);
        assert_eq!(fetch[0].relation_path, "role");
        assert_eq!(
            plan.count_sql(),
            "SELECT COUNT(*) AS total FROM users e \
             WHERE (LOWER(e.full_name) LIKE LOWER(CONCAT('%', :search_text, '%')) \
             OR LOWER(e.email) LIKE LOWER(CONCAT('%', :search_text, '%')))"
        );
    }

    #[test]
    fn empty_request_composes_without_where() {
        let registry = registry();
        let plan = QueryComposer::new(&registry).compose("User", &request()).unwrap();

        assert_eq!(
            plan.sql(),
            "SELECT e.* FROM users e \
             LEFT JOIN roles role_ ON role_.id = e.role_id \
             ORDER BY e.full_name ASC LIMIT :limit OFFSET :offset"
        );
        assert_eq!(plan.count_sql(), "SELECT COUNT(*) AS total FROM users e");
        assert_eq!(plan.binds().len(), 2);
    }

    #[test]
    fn sort_on_unsortable_field_is_rejected() {
        let registry = registry();
        let request = DataTableRequest {
            columns: vec![TableColumn {
                column_name: "role.name".to_owned(),
                filter: None,
                sort: Some(SortDirection::Asc),
            }],
            ..request()
        };

        let error = QueryComposer::new(&registry)
            .compose("User", &request)
            .unwrap_err();

        match error {
            SearchError::Validation { message, entries } => {
                assert!(message.contains("role.name"));
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].code, ERROR_CODE_NOT_SORTABLE);
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_field_is_rejected_not_skipped() {
        let registry = registry();
        let request = DataTableRequest {
            columns: vec![TableColumn {
                column_name: "passwordHash".to_owned(),
                filter: Some("eq:x".to_owned()),
                sort: None,
            }],
            ..request()
        };

        let error = QueryComposer::new(&registry)
            .compose("User", &request)
            .unwrap_err();

        match error {
            SearchError::Validation { entries, .. } => {
                assert_eq!(entries[0].code, ERROR_CODE_UNKNOWN_FIELD);
                assert_eq!(entries[0].field.as_deref(), Some("passwordHash"));
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn aliased_subquery_filter_uses_exists_without_join() {
        let registry = registry();
        let request = DataTableRequest {
            columns: vec![TableColumn {
                column_name: "companyName".to_owned(),
                filter: Some("cnt:acme".to_owned()),
                sort: None,
            }],
            ..request()
        };

        let plan = QueryComposer::new(&registry).compose("User", &request).unwrap();

        assert!(plan.sql().contains("EXISTS (SELECT 1 FROM company_users cu"));
        assert!(plan.sql().contains(":filter_companies_companyName"));
        assert_eq!(
            plan.bind("filter_companies_companyName"),
            Some(&BindValue::Text("acme".to_owned()))
        );

        // no join is added for the subquery-answered relation
        assert!(plan.joins().iter().all(|join| join.relation_path != "companies"));
        assert!(!plan.sql().contains("LEFT JOIN companies"));
        // the count query carries the same predicate
        assert!(plan.count_sql().contains("EXISTS (SELECT 1 FROM company_users cu"));
    }

    #[test]
    fn subquery_search_in_explicit_columns_adds_no_join() {
        let registry = registry();
        let request = DataTableRequest {
            search_filter: Some(SearchFilter {
                search_text: Some("acme".to_owned()),
                columns: Some(vec!["companyName".to_owned()]),
            }),
            ..request()
        };

        let plan = QueryComposer::new(&registry).compose("User", &request).unwrap();

        assert!(plan.sql().contains("EXISTS (SELECT 1 FROM company_users cu"));
        assert!(plan.sql().contains(":search_text"));
        assert!(plan.joins().iter().all(|join| join.relation_path != "companies"));
    }

    #[test]
    fn date_between_filter() {
        let registry = registry();
        let request = DataTableRequest {
            columns: vec![TableColumn {
                column_name: "createdOn".to_owned(),
                filter: Some("dbetween:2024-01-01,2024-03-31".to_owned()),
                sort: None,
            }],
            ..request()
        };

        let plan = QueryComposer::new(&registry).compose("User", &request).unwrap();

        let predicate =
            "DATE(e.created_on) BETWEEN :filter_createdOn_start AND :filter_createdOn_end";
        assert!(plan.sql().contains(predicate));
        assert!(plan.count_sql().contains(predicate));
        assert_eq!(
            plan.bind("filter_createdOn_start"),
            Some(&BindValue::Date(
                chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
            ))
        );
        assert_eq!(
            plan.bind("filter_createdOn_end"),
            Some(&BindValue::Date(
                chrono::NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
            ))
        );
        // no request sort, falls back to the default sort
        assert!(plan.sql().contains("ORDER BY e.full_name ASC"));
    }

    #[test]
    fn date_predicates_compare_date_only() {
        let registry = registry();
        let composer = QueryComposer::new(&registry);

        let with_filter = |filter: &str| DataTableRequest {
            columns: vec![TableColumn {
                column_name: "createdOn".to_owned(),
                filter: Some(filter.to_owned()),
                sort: None,
            }],
            ..request()
        };

        let date_only = composer
            .compose("User", &with_filter("dgte:2024-01-01"))
            .unwrap();
        let with_time = composer
            .compose("User", &with_filter("dgte:2024-01-01 23:59:59"))
            .unwrap();

        assert_eq!(date_only.sql(), with_time.sql());
        assert_eq!(date_only.binds(), with_time.binds());
    }

    #[test]
    fn wrong_between_arity_drops_the_predicate() {
        let registry = registry();
        let request = DataTableRequest {
            columns: vec![TableColumn {
                column_name: "createdOn".to_owned(),
                filter: Some("dbetween:2024-01-01".to_owned()),
                sort: None,
            }],
            ..request()
        };

        let plan = QueryComposer::new(&registry).compose("User", &request).unwrap();

        assert!(!plan.sql().contains("WHERE"));
        assert_eq!(plan.binds().len(), 2);
    }

    #[test]
    fn failed_numeric_coercion_drops_the_predicate() {
        let registry = registry();
        let request = DataTableRequest {
            columns: vec![TableColumn {
                column_name: "loginCount".to_owned(),
                filter: Some("gt:many".to_owned()),
                sort: None,
            }],
            ..request()
        };

        let plan = QueryComposer::new(&registry).compose("User", &request).unwrap();
        assert!(!plan.sql().contains("WHERE"));
    }

    #[test]
    fn eq_on_text_field_compares_as_string() {
        let registry = registry();
        let request = DataTableRequest {
            columns: vec![TableColumn {
                column_name: "email".to_owned(),
                filter: Some("eq:alice@example.org".to_owned()),
                sort: None,
            }],
            ..request()
        };

        let plan = QueryComposer::new(&registry).compose("User", &request).unwrap();

        assert!(plan.sql().contains("e.email = :filter_email"));
        assert_eq!(
            plan.bind("filter_email"),
            Some(&BindValue::Text("alice@example.org".to_owned()))
        );
    }

    #[test]
    fn bool_as_int_filter() {
        let registry = registry();
        let request = DataTableRequest {
            columns: vec![TableColumn {
                column_name: "isActive".to_owned(),
                filter: Some("eq:1".to_owned()),
                sort: None,
            }],
            ..request()
        };

        let plan = QueryComposer::new(&registry).compose("User", &request).unwrap();

        assert!(plan.sql().contains("e.is_active = :filter_isActive"));
        assert_eq!(plan.bind("filter_isActive"), Some(&BindValue::Int(1)));
    }

    #[test]
    fn empty_in_list_is_always_false() {
        let registry = registry();
        let request = DataTableRequest {
            columns: vec![TableColumn {
                column_name: "status".to_owned(),
                filter: Some("in:".to_owned()),
                sort: None,
            }],
            ..request()
        };

        let plan = QueryComposer::new(&registry).compose("User", &request).unwrap();
        assert!(plan.sql().contains("WHERE 1 = 0"));
    }

    #[test]
    fn in_list_expands_to_a_list_bind() {
        let registry = registry();
        let request = DataTableRequest {
            columns: vec![TableColumn {
                column_name: "status".to_owned(),
                filter: Some("in:active,blocked".to_owned()),
                sort: None,
            }],
            ..request()
        };

        let plan = QueryComposer::new(&registry).compose("User", &request).unwrap();

        assert!(plan.sql().contains("e.status IN (:filter_status)"));
        assert_eq!(
            plan.bind("filter_status"),
            Some(&BindValue::List(vec![
                BindValue::Text("active".to_owned()),
                BindValue::Text("blocked".to_owned()),
            ]))
        );

        let (positional, flat) = plan.positional(plan.sql()).unwrap();
        assert!(positional.contains("e.status IN ($1, $2)"));
        assert_eq!(flat.len(), 4);
    }

    #[test]
    fn null_operators_compile_without_binds() {
        let registry = registry();
        let request = DataTableRequest {
            columns: vec![
                TableColumn {
                    column_name: "createdOn".to_owned(),
                    filter: Some("notnull".to_owned()),
                    sort: None,
                },
                TableColumn {
                    column_name: "email".to_owned(),
                    filter: Some("isnull".to_owned()),
                    sort: None,
                },
            ],
            ..request()
        };

        let plan = QueryComposer::new(&registry).compose("User", &request).unwrap();

        assert!(plan
            .sql()
            .contains("WHERE e.created_on IS NOT NULL AND e.email IS NULL"));
        assert_eq!(plan.binds().len(), 2);
    }

    #[test]
    fn request_sorts_in_request_order() {
        let registry = registry();
        let request = DataTableRequest {
            columns: vec![
                TableColumn {
                    column_name: "email".to_owned(),
                    filter: None,
                    sort: Some(SortDirection::Desc),
                },
                TableColumn {
                    column_name: "fullName".to_owned(),
                    filter: None,
                    sort: Some(SortDirection::Asc),
                },
            ],
            ..request()
        };

        let plan = QueryComposer::new(&registry).compose("User", &request).unwrap();
        assert!(plan.sql().contains("ORDER BY e.email DESC, e.full_name ASC"));
    }

    #[test]
    fn search_on_relation_field_adds_a_plain_join() {
        let registry = registry();
        let request = DataTableRequest {
            search_filter: Some(SearchFilter {
                search_text: Some("admin".to_owned()),
                columns: Some(vec!["role.name".to_owned()]),
            }),
            ..request()
        };

        let plan = QueryComposer::new(&registry).compose("User", &request).unwrap();

        // the role join exists once, eager from the fetch join declaration
        // and marked required by the predicate
        let role_joins: Vec<_> = plan
            .joins()
            .iter()
            .filter(|join| join.relation_path == "role")
            .collect();
        assert_eq!(role_joins.len(), 1);
        assert!(role_joins[0].fetch);
        assert!(role_joins[0].required_for_filter);

        // kept in the count query because the predicate needs it
        assert!(plan.count_sql().contains("LEFT JOIN roles role_"));
    }

    #[test]
    fn duplicate_filters_get_distinct_params() {
        let registry = registry();
        let request = DataTableRequest {
            columns: vec![
                TableColumn {
                    column_name: "loginCount".to_owned(),
                    filter: Some("gte:10".to_owned()),
                    sort: None,
                },
                TableColumn {
                    column_name: "loginCount".to_owned(),
                    filter: Some("lte:100".to_owned()),
                    sort: None,
                },
            ],
            ..request()
        };

        let plan = QueryComposer::new(&registry).compose("User", &request).unwrap();

        assert!(plan.sql().contains("e.login_count >= :filter_loginCount"));
        assert!(plan.sql().contains("e.login_count <= :filter_loginCount_2"));
        assert_eq!(plan.bind("filter_loginCount"), Some(&BindValue::Long(10)));
        assert_eq!(plan.bind("filter_loginCount_2"), Some(&BindValue::Long(100)));
    }

    #[test]
    fn pagination_offsets() {
        let registry = registry();
        let request = DataTableRequest {
            pagination: Pagination { page: 3, size: 25 },
            ..request()
        };

        let plan = QueryComposer::new(&registry).compose("User", &request).unwrap();

        assert_eq!(plan.bind("limit"), Some(&BindValue::Long(25)));
        assert_eq!(plan.bind("offset"), Some(&BindValue::Long(75)));
    }

    #[test]
    fn base_query_extension() {
        let registry = registry();
        let base = "SELECT e.* FROM users e WHERE e.tenant_id = 42 ORDER BY e.email DESC";
        let request = DataTableRequest {
            columns: vec![TableColumn {
                column_name: "isActive".to_owned(),
                filter: Some("eq:1".to_owned()),
                sort: None,
            }],
            ..request()
        };

        let plan = QueryComposer::new(&registry)
            .compose_with_base("User", base, &request)
            .unwrap();

        assert_eq!(
            plan.sql(),
            "SELECT e.* FROM users e WHERE e.tenant_id = 42 \
             AND (e.is_active = :filter_isActive) \
             ORDER BY e.full_name ASC LIMIT :limit OFFSET :offset"
        );
        assert_eq!(
            plan.count_sql(),
            "SELECT COUNT(*) AS total FROM users e WHERE e.tenant_id = 42 \
             AND (e.is_active = :filter_isActive)"
        );
    }

    #[test]
    fn base_query_without_where_gets_one() {
        let registry = registry();
        let base = "SELECT e.* FROM users e";

        let plan = QueryComposer::new(&registry)
            .compose_with_base("User", base, &search_request("ali"))
            .unwrap();

        assert!(plan.sql().starts_with(
            "SELECT e.* FROM users e WHERE ((LOWER(e.full_name) LIKE"
        ));
        assert!(plan.count_sql().starts_with("SELECT COUNT(*) AS total FROM users e WHERE"));
    }

    #[test]
    fn base_query_validation_contract_holds() {
        let registry = registry();
        let request = DataTableRequest {
            columns: vec![TableColumn {
                column_name: "passwordHash".to_owned(),
                filter: Some("eq:x".to_owned()),
                sort: None,
            }],
            ..request()
        };

        let error = QueryComposer::new(&registry)
            .compose_with_base("User", "SELECT e.* FROM users e", &request)
            .unwrap_err();

        assert!(matches!(error, SearchError::Validation { .. }));
    }

    #[test]
    fn unknown_entity_is_reported() {
        let registry = registry();
        let error = QueryComposer::new(&registry)
            .compose("Tariff", &request())
            .unwrap_err();

        assert!(matches!(error, SearchError::UnknownEntity { .. }));
    }
}
