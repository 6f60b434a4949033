use futures::future::join_all;
use tracing::{info, instrument};
use crate::ddl_query_builder::DdlQueryBuilder;
use crate::models::*;
use crate::options::BranchOptions;
use crate::parallel_runner::ParallelRunner;
use crate::postgres_client_wrapper::PostgresClientWrapper;
use crate::quoting::{quote_value_string, AttemptedKeywordUsage, IdentifierQuoter};
use crate::{CleanupFailure, ElefantBranchError, Result};

mod counter;
mod rule;
mod stale;
mod view;

pub(crate) use counter::*;
pub(crate) use stale::restore_stale_state;

/// Marks schemas created for a branch, so they can be found again after a crash.
pub(crate) const BRANCH_SCHEMA_COMMENT: &str = "elefant-branch";
pub(crate) const SNAPSHOT_SUFFIX: &str = "snapshot";
pub(crate) const PLUS_SUFFIX: &str = "plus";
pub(crate) const MINUS_SUFFIX: &str = "minus";

/// Fails if any table needs a name for its snapshot or delta tables that another table already has,
/// or is named like the counter table.
pub(crate) fn check_branch_names(catalog: &Catalog) -> Result {
    for table in catalog.tables.values() {
        if table.name == COUNTER_TABLE_NAME {
            return Err(ElefantBranchError::BranchNameConflict {
                table: table.name.clone(),
                relation: COUNTER_TABLE_NAME.to_string(),
            });
        }

        for suffix in [SNAPSHOT_SUFFIX, PLUS_SUFFIX, MINUS_SUFFIX] {
            let derived = format!("{}{}", table.name, suffix);
            if catalog.get_table(&derived).is_some() {
                return Err(ElefantBranchError::BranchNameConflict {
                    table: table.name.clone(),
                    relation: derived,
                });
            }
        }
    }

    Ok(())
}

/// Creates and tears down the tables and views that make up a branch.
pub struct BranchDdl<'a> {
    connection: &'a PostgresClientWrapper,
    quoter: &'a IdentifierQuoter,
    options: &'a BranchOptions,
    namespace: String,
}

impl<'a> BranchDdl<'a> {
    pub fn new(
        connection: &'a PostgresClientWrapper,
        quoter: &'a IdentifierQuoter,
        options: &'a BranchOptions,
        namespace: &str,
    ) -> Self {
        BranchDdl {
            connection,
            quoter,
            options,
            namespace: namespace.to_string(),
        }
    }

    pub fn counter(&self) -> Counter {
        Counter::new(&self.namespace)
    }

    /// Creates the branch schema and its request counter, starting at 0.
    #[instrument(skip_all, fields(namespace = %self.namespace))]
    pub async fn create_namespace(&self) -> Result {
        let schema = self.quoter.quote(&self.namespace, AttemptedKeywordUsage::Other);
        let counter = self.counter();

        let sql = format!(
            "create schema if not exists {schema};\n\
             comment on schema {schema} is {comment};\n\
             create table {counter_table} ({value_column} bigint not null);\n\
             insert into {counter_table} ({value_column}) values (0);",
            comment = quote_value_string(BRANCH_SCHEMA_COMMENT),
            counter_table = counter.qualified_table(self.quoter),
            value_column = self.quoter.quote(&counter.value_column, AttemptedKeywordUsage::ColumnName),
        );

        self.connection.execute_non_query(&sql).await
    }

    /// Clones every table of the catalog into the branch, a few at a time.
    ///
    /// Every table is returned together with how far it got, also when cloning it failed.
    #[instrument(skip_all, fields(namespace = %self.namespace))]
    pub async fn clone_tables(&self, catalog: &Catalog) -> Vec<(ClonedTable, Result)> {
        let runner = ParallelRunner::new(self.options.get_max_parallel(catalog.tables.len()));

        let clones = catalog.tables.values().map(|table| runner.run(self.clone_table(table)));

        join_all(clones).await
    }

    /// Clones a single table, and moves the resulting view in front of it.
    #[instrument(skip_all, fields(namespace = %self.namespace, table = %table.name))]
    pub async fn clone_table(&self, table: &Table) -> (ClonedTable, Result) {
        let mut cloned = describe_clone(table, &self.namespace, self.quoter);
        let result = self.run_clone_steps(table, &mut cloned).await;

        if result.is_ok() {
            info!(table = %table.name, "Table branched");
        }

        (cloned, result)
    }

    async fn run_clone_steps(&self, table: &Table, cloned: &mut ClonedTable) -> Result {
        if table.columns.contains_key(REQUEST_ID_COLUMN) {
            return Err(ElefantBranchError::CounterColumnConflict {
                table: table.name.clone(),
                column: REQUEST_ID_COLUMN.to_string(),
            });
        }

        self.step(table, "create the delta tables", self.create_delta_tables(cloned)).await?;
        cloned.phase = ClonePhase::DeltaTablesCreated;

        self.step(table, "create the view", self.create_view(table, cloned)).await?;
        cloned.phase = ClonePhase::ViewCreated;

        self.step(table, "rename the table to its snapshot name", self.rename_table(&cloned.snapshot, &self.snapshot_name(table))).await?;
        cloned.snapshot.name = self.snapshot_name(table);
        cloned.phase = ClonePhase::SnapshotRenamed;

        self.step(table, "move the view in front of the table", self.move_view(&cloned.view, &table.schema_name)).await?;
        cloned.view.schema_name = table.schema_name.clone();
        cloned.phase = ClonePhase::ViewPromoted;

        Ok(())
    }

    async fn step(&self, table: &Table, step: &'static str, run: impl std::future::Future<Output = Result>) -> Result {
        run.await.map_err(|e| ElefantBranchError::TableCloneFailed {
            table: table.name.clone(),
            step,
            source: Box::new(e),
        })
    }

    fn snapshot_name(&self, table: &Table) -> String {
        format!("{}{}", table.name, SNAPSHOT_SUFFIX)
    }

    async fn create_delta_tables(&self, cloned: &ClonedTable) -> Result {
        let mut sql = String::new();
        for delta in [&cloned.plus, &cloned.minus] {
            let mut builder = DdlQueryBuilder::new(self.quoter);
            let mut table_builder = builder.create_table(&delta.schema_name, &delta.name);
            for column in delta.columns.values() {
                let mut column_builder = table_builder.column(&column.name, &column.type_definition());
                if !column.is_nullable {
                    column_builder.not_null();
                }
            }
            sql.push_str(&builder.build());
            sql.push('\n');
        }

        self.connection.execute_non_query(&sql).await
    }

    async fn create_view(&self, table: &Table, cloned: &ClonedTable) -> Result {
        let mut sql = view::create_view_sql(table, cloned, self.quoter);

        let qualified_view = self.quoter.quote_qualified(&cloned.view.schema_name, &cloned.view.name);
        for column in table.columns.values() {
            // Sequences stay with the original table, the insert trigger numbers rows itself.
            if matches!(column.generator, Some(ValueGenerator::Sequence { .. })) {
                continue;
            }

            if let Some(default) = &column.default_value {
                sql.push_str(&format!(
                    "\nalter view {} alter column {} set default {};",
                    qualified_view,
                    self.quoter.quote(&column.name, AttemptedKeywordUsage::ColumnName),
                    default
                ));
            }
        }

        for rule in &cloned.view.rules {
            sql.push('\n');
            sql.push_str(&rule.definition);
        }

        self.connection.execute_non_query(&sql).await
    }

    async fn rename_table(&self, table: &Table, new_name: &str) -> Result {
        let sql = format!(
            "alter table {} rename to {};",
            self.quoter.quote_qualified(&table.schema_name, &table.name),
            self.quoter.quote(new_name, AttemptedKeywordUsage::Other)
        );

        self.connection.execute_non_query(&sql).await
    }

    async fn move_view(&self, view: &View, schema: &str) -> Result {
        let sql = format!(
            "alter view {} set schema {};",
            self.quoter.quote_qualified(&view.schema_name, &view.name),
            self.quoter.quote(schema, AttemptedKeywordUsage::Other)
        );

        self.connection.execute_non_query(&sql).await
    }

    /// Puts the original table back under its own name and moves the view back into the branch.
    ///
    /// Only undoes the steps the table actually reached. The delta tables and the view are kept.
    #[instrument(skip_all, fields(namespace = %self.namespace, table = %cloned.name))]
    pub async fn reset_table(&self, cloned: &mut ClonedTable) -> Vec<CleanupFailure> {
        let mut failures = Vec::new();

        if cloned.phase >= ClonePhase::ViewPromoted {
            match self.move_view(&cloned.view, &self.namespace).await {
                Ok(()) => {
                    cloned.view.schema_name = self.namespace.clone();
                    cloned.phase = ClonePhase::SnapshotRenamed;
                }
                Err(error) => failures.push(CleanupFailure {
                    object: format!("view {}.{}", cloned.view.schema_name, cloned.view.name),
                    error,
                }),
            }
        }

        if cloned.phase == ClonePhase::SnapshotRenamed {
            match self.rename_table(&cloned.snapshot, &cloned.name).await {
                Ok(()) => {
                    cloned.snapshot.name = cloned.name.clone();
                    cloned.phase = ClonePhase::ViewCreated;
                }
                Err(error) => failures.push(CleanupFailure {
                    object: format!("table {}.{}", cloned.snapshot.schema_name, cloned.snapshot.name),
                    error,
                }),
            }
        }

        failures
    }

    /// Drops the branch schema and everything in it.
    #[instrument(skip_all, fields(namespace = %self.namespace))]
    pub async fn drop_namespace(&self) -> Result {
        let sql = format!(
            "drop schema if exists {} cascade;",
            self.quoter.quote(&self.namespace, AttemptedKeywordUsage::Other)
        );

        self.connection.execute_non_query(&sql).await
    }

    /// If a schema with the namespace's name already exists.
    pub async fn namespace_exists(&self) -> Result<bool> {
        let sql = format!(
            "select exists(select 1 from pg_namespace where nspname = {});",
            quote_value_string(&self.namespace)
        );

        self.connection.get_single_result(&sql).await
    }
}

/// Everything the branch will consist of for this table, before any of it exists.
pub(crate) fn describe_clone(table: &Table, namespace: &str, quoter: &IdentifierQuoter) -> ClonedTable {
    let counter = Counter::new(namespace);

    let delta_table = |suffix: &str| {
        let mut delta = Table::new(namespace, &format!("{}{}", table.name, suffix));
        delta.columns = table.columns.clone();
        delta.columns.insert(
            counter.request_id_column.clone(),
            Column {
                name: counter.request_id_column.clone(),
                ordinal_position: table.columns.len() as i32 + 1,
                data_type: "bigint".to_string(),
                is_nullable: true,
                ..crate::default()
            },
        );
        delta
    };

    let view = View {
        schema_name: namespace.to_string(),
        name: table.name.clone(),
        columns: table
            .columns
            .iter()
            .map(|(name, column)| {
                (
                    name.clone(),
                    Column {
                        is_nullable: true,
                        ..column.clone()
                    },
                )
            })
            .collect(),
        rules: table
            .rules
            .iter()
            .map(|r| rule::rewrite_rule_for_view(r, &table.schema_name, namespace, quoter))
            .collect(),
    };

    ClonedTable {
        name: table.name.clone(),
        snapshot: table.clone(),
        plus: delta_table(PLUS_SUFFIX),
        minus: delta_table(MINUS_SUFFIX),
        view,
        counter,
        functions: vec![],
        triggers: vec![],
        phase: ClonePhase::Pending,
    }
}
