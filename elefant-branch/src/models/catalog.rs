use std::collections::BTreeMap;
use serde::Serialize;
use crate::models::table::Table;

/// The tables of one schema, as read from Postgres.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize)]
pub struct Catalog {
    pub schema_name: String,
    pub tables: BTreeMap<String, Table>,
}

impl Catalog {
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }
}
