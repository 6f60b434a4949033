use std::collections::BTreeMap;
use futures::future::join_all;
use itertools::Itertools;
use serde::Serialize;
use tracing::{info, instrument, warn};
use crate::branch_ddl::{check_branch_names, increment_counter, read_counter, restore_stale_state, BranchDdl};
use crate::catalog_reader::CatalogReader;
use crate::diff::{DbDiff, Diff};
use crate::models::*;
use crate::options::BranchOptions;
use crate::parallel_runner::ParallelRunner;
use crate::postgres_client_wrapper::PostgresClientWrapper;
use crate::quoting::IdentifierQuoter;
use crate::trigger_builder::{install_triggers, uninstall_triggers};
use crate::{CleanupFailure, ElefantBranchError, Result};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub enum BranchState {
    /// Writes to the tables go into the branch.
    Active,
    /// The tables are back to normal, the changes of the branch are kept for diffing.
    Committed,
    Deleted,
}

#[derive(Debug, Clone, Serialize)]
pub struct Branch {
    pub namespace: String,
    pub state: BranchState,
    pub counter: Counter,
    pub tables: BTreeMap<String, ClonedTable>,
}

/// Creates, commits and deletes branches, and diffs them against each other.
///
/// Only one branch can be active at a time, since the active branch takes the place of the tables.
pub struct Brancher<'a> {
    connection: &'a PostgresClientWrapper,
    quoter: IdentifierQuoter,
    options: BranchOptions,
    branches: BTreeMap<String, Branch>,
    active: Option<String>,
}

impl<'a> Brancher<'a> {
    /// Connects the brancher, restoring anything an earlier run left behind.
    #[instrument(skip_all, fields(schema = %options.schema))]
    pub async fn new(connection: &'a PostgresClientWrapper, options: BranchOptions) -> Result<Brancher<'a>> {
        let quoter = IdentifierQuoter::load(connection).await?;
        restore_stale_state(connection, &quoter, &options.schema).await?;

        Ok(Brancher {
            connection,
            quoter,
            options,
            branches: BTreeMap::new(),
            active: None,
        })
    }

    pub fn get_branch(&self, namespace: &str) -> Option<&Branch> {
        self.branches.get(namespace)
    }

    pub fn active_branch(&self) -> Option<&str> {
        self.active.as_deref()
    }

    fn ddl(&self, namespace: &str) -> BranchDdl<'_> {
        BranchDdl::new(self.connection, &self.quoter, &self.options, namespace)
    }

    fn known_branch(&self, namespace: &str) -> Result<&Branch> {
        self.branches
            .get(namespace)
            .ok_or_else(|| ElefantBranchError::UnknownBranch(namespace.to_string()))
    }

    /// Branches every table of the schema into `namespace`.
    ///
    /// If only part of the branch could be created, the branch is still registered as active
    /// so it can be torn down again with [`Brancher::delete`].
    #[instrument(skip_all, fields(namespace = namespace))]
    pub async fn branch(&mut self, namespace: &str) -> Result<&Branch> {
        if let Some(active) = &self.active {
            return Err(ElefantBranchError::BranchAlreadyActive(active.clone()));
        }

        if self.branches.contains_key(namespace) || self.ddl(namespace).namespace_exists().await? {
            return Err(ElefantBranchError::BranchAlreadyExists(namespace.to_string()));
        }

        let catalog = CatalogReader::new(self.connection, &self.options).read_catalog().await?;
        check_branch_names(&catalog)?;

        let (tables, result) = self.create_branch(namespace, &catalog).await;

        self.branches.insert(
            namespace.to_string(),
            Branch {
                namespace: namespace.to_string(),
                state: BranchState::Active,
                counter: Counter::new(namespace),
                tables,
            },
        );
        self.active = Some(namespace.to_string());

        if let Err(e) = result {
            return Err(ElefantBranchError::BranchCreationFailed {
                namespace: namespace.to_string(),
                source: Box::new(e),
            });
        }

        info!(namespace, tables = catalog.tables.len(), "Branch created");
        self.known_branch(namespace)
    }

    async fn create_branch(&self, namespace: &str, catalog: &Catalog) -> (BTreeMap<String, ClonedTable>, Result) {
        let ddl = self.ddl(namespace);

        if let Err(e) = ddl.create_namespace().await {
            return (BTreeMap::new(), Err(e));
        }

        let mut first_error = None;
        let mut cloned_tables = Vec::with_capacity(catalog.tables.len());
        for (cloned, result) in ddl.clone_tables(catalog).await {
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
            cloned_tables.push(cloned);
        }

        if first_error.is_none() {
            let runner = ParallelRunner::new(self.options.get_max_parallel(cloned_tables.len()));
            let installs = cloned_tables.iter_mut().map(|cloned| {
                runner.run(async move {
                    let name = cloned.name.clone();
                    install_triggers(self.connection, &self.quoter, cloned)
                        .await
                        .map_err(|e| ElefantBranchError::TableCloneFailed {
                            table: name,
                            step: "install the triggers",
                            source: Box::new(e),
                        })
                })
            });

            for result in join_all(installs).await {
                if let Err(e) = result {
                    first_error.get_or_insert(e);
                }
            }
        }

        let tables = cloned_tables
            .into_iter()
            .map(|cloned| (cloned.name.clone(), cloned))
            .collect();

        match first_error {
            Some(e) => (tables, Err(e)),
            None => (tables, Ok(())),
        }
    }

    /// Puts the original tables back in place. The changes made in the branch are kept for diffing.
    #[instrument(skip_all, fields(namespace = namespace))]
    pub async fn commit(&mut self, namespace: &str) -> Result {
        let branch = self.known_branch(namespace)?;
        if branch.state != BranchState::Active {
            return Err(ElefantBranchError::BranchNotActive(namespace.to_string()));
        }

        let failures = self.reset(namespace).await;
        if !failures.is_empty() {
            return Err(ElefantBranchError::CleanupFailed(failures));
        }

        if let Some(branch) = self.branches.get_mut(namespace) {
            branch.state = BranchState::Committed;
        }
        self.active = None;

        info!(namespace, "Branch committed");
        Ok(())
    }

    /// Removes the branch and everything it recorded. An active branch is reset first.
    #[instrument(skip_all, fields(namespace = namespace))]
    pub async fn delete(&mut self, namespace: &str) -> Result<Branch> {
        let mut failures = Vec::new();

        if self.known_branch(namespace)?.state == BranchState::Active {
            warn!(namespace, "Deleting a branch that was never committed");
            failures.extend(self.reset(namespace).await);
        }

        if failures.is_empty() {
            if let Err(error) = self.ddl(namespace).drop_namespace().await {
                failures.push(CleanupFailure {
                    object: format!("schema {namespace}"),
                    error,
                });
            }
        }

        if !failures.is_empty() {
            return Err(ElefantBranchError::CleanupFailed(failures));
        }

        if self.active.as_deref() == Some(namespace) {
            self.active = None;
        }

        let mut branch = self
            .branches
            .remove(namespace)
            .ok_or_else(|| ElefantBranchError::UnknownBranch(namespace.to_string()))?;
        branch.state = BranchState::Deleted;

        info!(namespace, "Branch deleted");
        Ok(branch)
    }

    /// Takes the triggers off every table of the branch and moves the original tables back.
    async fn reset(&mut self, namespace: &str) -> Vec<CleanupFailure> {
        let Some(mut branch) = self.branches.remove(namespace) else {
            return vec![];
        };

        let mut failures = Vec::new();
        {
            let ddl = self.ddl(namespace);
            for cloned in branch.tables.values_mut() {
                failures.extend(uninstall_triggers(self.connection, &self.quoter, cloned).await);
                if cloned.triggers.is_empty() {
                    failures.extend(ddl.reset_table(cloned).await);
                }
            }
        }

        self.branches.insert(namespace.to_string(), branch);
        failures
    }

    /// Starts the next request of the branch and returns its id.
    pub async fn increment_request_id(&self, namespace: &str) -> Result<i64> {
        let branch = self.known_branch(namespace)?;
        increment_counter(self.connection, &self.quoter, &branch.counter).await
    }

    pub async fn current_request_id(&self, namespace: &str) -> Result<i64> {
        let branch = self.known_branch(namespace)?;
        read_counter(self.connection, &self.quoter, &branch.counter).await
    }

    /// Diffs every table of two branches as they were after request `n`.
    ///
    /// `skip_columns` maps a table name to the columns of it that are left out of the comparison.
    #[instrument(skip_all, fields(control = control, experimental = experimental, n))]
    pub async fn compute_diff_at_n(
        &self,
        control: &str,
        experimental: &str,
        n: i64,
        skip_columns: &BTreeMap<String, Vec<String>>,
    ) -> Result<BTreeMap<String, Diff>> {
        let a = self.known_branch(control)?;
        let b = self.known_branch(experimental)?;

        if !a.tables.keys().eq(b.tables.keys()) {
            return Err(ElefantBranchError::TableSetMismatch {
                left: a.tables.keys().cloned().collect_vec(),
                right: b.tables.keys().cloned().collect_vec(),
            });
        }

        let differ = DbDiff::new(self.connection, &self.quoter, &a.counter.request_id_column);
        let no_skipped_columns = Vec::new();

        let mut diffs = BTreeMap::new();
        for (name, a_table) in &a.tables {
            let Some(b_table) = b.tables.get(name) else {
                continue;
            };
            let skipped = skip_columns.get(name).unwrap_or(&no_skipped_columns);

            let diff = differ.diff_tables_at_n(a_table, b_table, n, skipped).await?;
            diffs.insert(name.clone(), diff);
        }

        Ok(diffs)
    }

    /// Diffs the two branches after each of the first `count` requests.
    pub async fn compute_diff_per_request(
        &self,
        control: &str,
        experimental: &str,
        count: i64,
        skip_columns: &BTreeMap<String, Vec<String>>,
    ) -> Result<Vec<BTreeMap<String, Diff>>> {
        let mut diffs = Vec::with_capacity(count.max(0) as usize);
        for n in 0..count {
            diffs.push(self.compute_diff_at_n(control, experimental, n, skip_columns).await?);
        }

        Ok(diffs)
    }
}
