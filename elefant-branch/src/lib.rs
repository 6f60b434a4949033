#[cfg(any(test, feature = "test_utilities"))]
pub mod test_helpers;

mod postgres_client_wrapper;
mod catalog_reader;
mod models;
mod error;
mod options;
mod parallel_runner;
mod quoting;
mod helpers;
mod ddl_query_builder;
mod branch_ddl;
mod trigger_builder;
mod brancher;
mod diff;

pub use error::*;
pub use models::*;
pub use options::*;
pub use postgres_client_wrapper::{FromRow, PostgresClientWrapper};
pub use quoting::{AttemptedKeywordUsage, IdentifierQuoter};
pub use catalog_reader::CatalogReader;
pub use branch_ddl::BranchDdl;
pub use trigger_builder::{TriggerProcedure, TriggerStatement};
pub use brancher::{Branch, BranchState, Brancher};
pub use diff::{DbDiff, Diff, Row};

pub(crate) fn default<T: Default>() -> T {
    T::default()
}
