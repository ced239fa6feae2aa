// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Runtime search and query composition for data-table endpoints
//!
//! Every searchable list endpoint declares a [`SearchDescriptor`] for its
//! entity: which fields may be searched, sorted and filtered, which
//! associations are eagerly joined and which predicates are answered by an
//! `EXISTS` subquery instead of a join. At request time the
//! [`QueryComposer`] turns the descriptor and a
//! [`DataTableRequest`](opentalk_admin_types_api_v1::DataTableRequest) into
//! a parameterized SQL query plus a matching count query, which
//! [`fetch_page`] runs on the read route.
//!
//! Descriptors are registered once at startup into a [`SearchRegistry`];
//! registration validates every declared path against the entity's
//! [`EntityGraph`], so production requests never probe the schema.

mod bind;
mod compose;
mod dates;
mod descriptor;
mod error;
mod execute;
mod field_type;
mod filter;
mod graph;
mod plan;
mod registry;

pub use bind::BindValue;
pub use compose::QueryComposer;
pub use dates::{parse_date, parse_date_time};
pub use descriptor::{SearchDescriptor, SearchDescriptorBuilder, SortField, SubquerySpec};
pub use error::{api_error_from_database, DescriptorError, SearchError};
pub use execute::fetch_page;
pub use field_type::FieldType;
pub use filter::{FilterCriteria, FilterOperator, FilterParseError};
pub use graph::{EntityGraph, FieldDef, GraphRegistry, RelationDef, RelationKind};
pub use plan::{ExecutionPlan, Join};
pub use registry::{SearchRegistry, SearchRegistryBuilder};
