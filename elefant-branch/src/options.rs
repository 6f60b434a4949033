use std::num::NonZeroUsize;
use serde::Serialize;

/// Settings shared by every part of the branching process.
#[derive(Debug, Clone)]
pub struct BranchOptions {
    /// The schema holding the tables that are branched.
    pub schema: String,
    /// How many tables to set up in parallel at most. Defaults to all of them at once.
    pub max_parallel: Option<NonZeroUsize>,
    pub primary_key_policy: PrimaryKeyPolicy,
}

impl Default for BranchOptions {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            max_parallel: None,
            primary_key_policy: PrimaryKeyPolicy::default(),
        }
    }
}

impl BranchOptions {
    pub(crate) fn get_max_parallel(&self, number_of_tables: usize) -> NonZeroUsize {
        let all = NonZeroUsize::new(number_of_tables).unwrap_or(NonZeroUsize::MIN);
        match self.max_parallel {
            Some(max) => max.min(all),
            None => all,
        }
    }
}

/// How the key of a table is found.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize)]
pub enum PrimaryKeyPolicy {
    /// The first unique index with `pkey` in its name.
    #[default]
    IndexNameHeuristic,
    /// The index Postgres has marked as the primary key.
    CatalogPrimaryKey,
}
