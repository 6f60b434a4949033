use std::collections::BTreeMap;
use serde::Serialize;
use crate::models::column::Column;
use crate::models::foreign_key::{ForeignKeyConstraint, Reference};
use crate::models::index::Index;
use crate::models::rule::Rule;
use crate::default;

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize)]
pub struct Table {
    pub schema_name: String,
    /// The current name of the table. This changes when the table is moved aside for a branch.
    pub name: String,
    /// Keyed by column name, so iteration is always in lexicographic order.
    pub columns: BTreeMap<String, Column>,
    pub indices: Vec<Index>,
    pub rules: Vec<Rule>,
    /// Foreign keys from this table to other tables.
    pub foreign_keys: Vec<ForeignKeyConstraint>,
    /// Foreign keys from other tables to this table.
    pub references: Vec<Reference>,
    pub key: TableKey,
}

impl Table {
    pub fn new(schema_name: &str, name: &str) -> Self {
        Table {
            schema_name: schema_name.to_string(),
            name: name.to_string(),
            ..default()
        }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|c| c.as_str())
    }

    pub fn unique_indices(&self) -> impl Iterator<Item = &Index> {
        self.indices.iter().filter(|i| i.is_enforceable_unique())
    }

    /// Columns whose value is generated when an insert leaves them out.
    pub fn generated_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values().filter(|c| c.is_generated())
    }
}

/// How rows of a table can be told apart.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize)]
pub enum TableKey {
    /// Rows are identified by these columns.
    Keyed { columns: Vec<String> },
    /// Rows can only be compared as a whole, and duplicates are allowed.
    #[default]
    Unkeyed,
}

impl TableKey {
    pub fn from_columns(columns: Vec<String>) -> Self {
        if columns.is_empty() {
            TableKey::Unkeyed
        } else {
            TableKey::Keyed { columns }
        }
    }

    /// The key left when some columns are not compared. Losing any key column loses the key.
    pub fn without_columns(&self, skipped: &[String]) -> TableKey {
        match self {
            TableKey::Keyed { columns } if !columns.iter().any(|c| skipped.contains(c)) => self.clone(),
            _ => TableKey::Unkeyed,
        }
    }
}
