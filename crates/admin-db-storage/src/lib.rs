// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Contains the database ORM for the admin service entities
//! Builds upon opentalk-admin-database and opentalk-admin-datatable

#[macro_use]
extern crate diesel;

mod schema;

pub mod companies;
pub mod roles;
pub mod users;

use opentalk_admin_datatable::{DescriptorError, SearchRegistry, SearchRegistryBuilder};

/// Build the sealed search registry for all admin entities
///
/// Called once at startup; a descriptor that fails validation keeps the
/// service from becoming ready.
pub fn build_registry() -> Result<SearchRegistry, DescriptorError> {
    let registry = SearchRegistryBuilder::new()
        .graph(users::entity_graph())
        .graph(roles::entity_graph())
        .graph(companies::entity_graph())
        .descriptor(users::search_descriptor())?
        .descriptor(roles::search_descriptor())?
        .descriptor(companies::search_descriptor())?
        .build();

    Ok(registry)
}
