use std::collections::BTreeMap;
use futures::try_join;
use tracing::{instrument, warn};
use crate::models::*;
use crate::options::{BranchOptions, PrimaryKeyPolicy};
use crate::postgres_client_wrapper::PostgresClientWrapper;
use crate::Result;

mod column;
mod foreign_key;
mod index;
mod rule;
mod table;
mod trigger;

/// Reads the tables of the configured schema from Postgres.
pub struct CatalogReader<'a> {
    connection: &'a PostgresClientWrapper,
    options: &'a BranchOptions,
}

impl<'a> CatalogReader<'a> {
    pub fn new(connection: &'a PostgresClientWrapper, options: &'a BranchOptions) -> Self {
        CatalogReader { connection, options }
    }

    #[instrument(skip_all, fields(schema = %self.options.schema))]
    pub async fn read_catalog(&self) -> Result<Catalog> {
        let (tables, columns, indices, rules, foreign_keys) = try_join!(
            self.get_tables(),
            self.get_columns(),
            self.get_indices(),
            self.get_rules(),
            self.get_foreign_keys(),
        )?;

        let mut catalog = Catalog {
            schema_name: self.options.schema.clone(),
            tables: BTreeMap::new(),
        };

        for row in tables {
            let table = Table::new(&self.options.schema, &row.name);
            catalog.tables.insert(row.name, table);
        }

        for row in columns {
            if let Some(table) = catalog.tables.get_mut(&row.table_name) {
                let column = row.to_column()?;
                table.columns.insert(column.name.clone(), column);
            }
        }

        for row in indices {
            if let Some(table) = catalog.tables.get_mut(&row.table_name) {
                table.indices.push(row.to_index());
            }
        }

        for row in rules {
            if let Some(table) = catalog.tables.get_mut(&row.table_name) {
                table.rules.push(row.to_rule());
            }
        }

        for table in catalog.tables.values_mut() {
            table.key = resolve_key(&table.name, &table.indices, self.options.primary_key_policy);
        }

        // Every constraint is mirrored onto the table it points at, so the referenced side
        // knows what to protect.
        let foreign_keys = foreign_keys.into_iter().map(|row| row.to_constraint()).collect::<Vec<_>>();
        for constraint in &foreign_keys {
            if constraint.referenced_schema_name != self.options.schema {
                continue;
            }

            if let Some(referenced) = catalog.tables.get_mut(&constraint.referenced_table_name) {
                referenced.references.push(constraint.to_reference());
            }
        }

        for constraint in foreign_keys {
            if let Some(table) = catalog.tables.get_mut(&constraint.table_name) {
                table.foreign_keys.push(constraint);
            }
        }

        Ok(catalog)
    }
}

/// Finds the key of a table with the given policy, and warns when the two ways of finding it disagree.
fn resolve_key(table_name: &str, indices: &[Index], policy: PrimaryKeyPolicy) -> TableKey {
    let by_name = indices
        .iter()
        .find(|i| i.looks_like_primary_key() && !i.column_names.is_empty());
    let by_catalog = indices
        .iter()
        .find(|i| i.is_primary_key && !i.column_names.is_empty());

    let name_columns = by_name.map(|i| &i.column_names);
    let catalog_columns = by_catalog.map(|i| &i.column_names);

    if name_columns != catalog_columns {
        warn!(
            table = table_name,
            by_index_name = ?name_columns,
            by_catalog = ?catalog_columns,
            "The primary key of the table is ambiguous"
        );
    }

    let chosen = match policy {
        PrimaryKeyPolicy::IndexNameHeuristic => by_name,
        PrimaryKeyPolicy::CatalogPrimaryKey => by_catalog,
    };

    match chosen {
        Some(index) => TableKey::from_columns(index.column_names.clone()),
        None => TableKey::Unkeyed,
    }
}

/// Defines a query against the catalog, restricted to the configured schema with `{schema}`.
macro_rules! define_catalog_query {
    ($fn_name:ident, $result:ident, $query:literal) => {
        impl $crate::catalog_reader::CatalogReader<'_> {
            #[tracing::instrument(skip_all)]
            pub(in crate::catalog_reader) async fn $fn_name(&self) -> $crate::Result<Vec<$result>> {
                let schema = $crate::quoting::quote_value_string(&self.options.schema);
                let sql = format!($query, schema = schema);
                self.connection.get_results(&sql).await
            }
        }
    };
}

pub(crate) use define_catalog_query;

#[cfg(test)]
mod key_tests {
    use super::*;
    use crate::default;

    fn index(name: &str, is_primary_key: bool, columns: &[&str]) -> Index {
        Index {
            name: name.to_string(),
            is_unique: true,
            is_primary_key,
            column_names: columns.iter().map(|c| c.to_string()).collect(),
            ..default()
        }
    }

    #[test]
    fn key_from_index_name() {
        let indices = vec![
            index("users_username_key", false, &["username"]),
            index("users_pkey", true, &["accountid"]),
        ];

        assert_eq!(
            resolve_key("users", &indices, PrimaryKeyPolicy::IndexNameHeuristic),
            TableKey::Keyed { columns: vec!["accountid".to_string()] }
        );
    }

    #[test]
    fn policies_can_disagree() {
        let indices = vec![
            index("legacy_pkey", false, &["code"]),
            index("orders_identity", true, &["id"]),
        ];

        assert_eq!(
            resolve_key("orders", &indices, PrimaryKeyPolicy::IndexNameHeuristic),
            TableKey::Keyed { columns: vec!["code".to_string()] }
        );
        assert_eq!(
            resolve_key("orders", &indices, PrimaryKeyPolicy::CatalogPrimaryKey),
            TableKey::Keyed { columns: vec!["id".to_string()] }
        );
    }

    #[test]
    fn expression_indices_are_never_keys() {
        let indices = vec![index("lower_name_pkey", true, &[])];

        assert_eq!(resolve_key("t", &indices, PrimaryKeyPolicy::IndexNameHeuristic), TableKey::Unkeyed);
        assert_eq!(resolve_key("t", &indices, PrimaryKeyPolicy::CatalogPrimaryKey), TableKey::Unkeyed);
    }

    #[test]
    fn no_indices_means_unkeyed() {
        assert_eq!(resolve_key("t", &[], PrimaryKeyPolicy::IndexNameHeuristic), TableKey::Unkeyed);
    }
}
