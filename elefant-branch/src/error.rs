use itertools::Itertools;
use std::fmt::{Display, Formatter};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ElefantBranchError {
    #[error("Error from postgres: `{0}`")]
    PostgresError(#[from] tokio_postgres::Error),

    #[error("Error from postgres: `{query}` when executing query: `{source}`")]
    PostgresErrorWithQuery {
        query: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Invalid number of results returned from query. Expected `{expected}`, got `{actual}`")]
    InvalidNumberOfResults {
        actual: usize,
        expected: usize,
    },

    #[error("Postgres version {0} is not supported, at least Postgres 12 is required")]
    UnsupportedPostgresVersion(i32),

    #[error("Postgres did not respond with a version when asked for one")]
    InvalidPostgresVersionResponse,

    #[error("Invalid keyword type '{0}'")]
    InvalidKeywordType(String),

    #[error("Unknown trigger event, timing or level '{0}'")]
    UnknownTriggerValue(String),

    #[error("Unknown reference action '{0}'")]
    UnknownReferenceAction(String),

    #[error("Could not parse {field} `{value}` of column {table}.{column}")]
    CatalogParse {
        table: String,
        column: String,
        field: &'static str,
        value: String,
    },

    #[error("Relations {left} and {right} have different columns and cannot be compared")]
    ColumnMismatch {
        left: String,
        right: String,
    },

    #[error("Branch {0} is still pending, please commit it first")]
    BranchAlreadyActive(String),

    #[error("Branch {0} already exists")]
    BranchAlreadyExists(String),

    #[error("Branch {0} does not exist")]
    UnknownBranch(String),

    #[error("Branch {0} is not active, it has already been committed")]
    BranchNotActive(String),

    #[error("Branches have different tables, {left:?} and {right:?}, and cannot be compared")]
    TableSetMismatch {
        left: Vec<String>,
        right: Vec<String>,
    },

    #[error("Table {table} already has a column named {column}, which is needed to track requests")]
    CounterColumnConflict {
        table: String,
        column: String,
    },

    #[error("Table {table} cannot be branched, the name {relation} it needs is already taken")]
    BranchNameConflict {
        table: String,
        relation: String,
    },

    #[error("Failed to {step} for table {table}: {source}")]
    TableCloneFailed {
        table: String,
        step: &'static str,
        #[source]
        source: Box<ElefantBranchError>,
    },

    #[error("Failed to create branch {namespace}: {source}")]
    BranchCreationFailed {
        namespace: String,
        #[source]
        source: Box<ElefantBranchError>,
    },

    #[error("Diff of table {table} is misaligned: control has {control} rows, baseline {baseline} and experimental {experimental}")]
    DiffLengthMismatch {
        table: String,
        control: usize,
        baseline: usize,
        experimental: usize,
    },

    #[error("Cleanup failed for {} objects: {}", .0.len(), .0.iter().join("; "))]
    CleanupFailed(Vec<CleanupFailure>),

    #[error("io error: `{0}`")]
    IoError(#[from] std::io::Error),
}

/// A single object that could not be dropped or restored while tearing down a branch.
#[derive(Debug)]
pub struct CleanupFailure {
    pub object: String,
    pub error: ElefantBranchError,
}

impl Display for CleanupFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.object, self.error)
    }
}

impl ElefantBranchError {
    /// The error code raised by Postgres, if this error came from the database.
    pub fn sql_state(&self) -> Option<&tokio_postgres::error::SqlState> {
        match self {
            ElefantBranchError::PostgresError(e)
            | ElefantBranchError::PostgresErrorWithQuery { source: e, .. } => {
                e.as_db_error().map(|db| db.code())
            }
            ElefantBranchError::TableCloneFailed { source, .. }
            | ElefantBranchError::BranchCreationFailed { source, .. } => source.sql_state(),
            _ => None,
        }
    }

    /// The message raised by Postgres, if this error came from the database.
    pub fn database_message(&self) -> Option<&str> {
        match self {
            ElefantBranchError::PostgresError(e)
            | ElefantBranchError::PostgresErrorWithQuery { source: e, .. } => {
                e.as_db_error().map(|db| db.message())
            }
            ElefantBranchError::TableCloneFailed { source, .. }
            | ElefantBranchError::BranchCreationFailed { source, .. } => source.database_message(),
            _ => None,
        }
    }
}

pub type Result<T = ()> = std::result::Result<T, ElefantBranchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_failures_lists_every_object() {
        let error = ElefantBranchError::CleanupFailed(vec![
            CleanupFailure {
                object: "trigger users_redirect_insert_trigger".to_string(),
                error: ElefantBranchError::UnknownBranch("a".to_string()),
            },
            CleanupFailure {
                object: "schema a".to_string(),
                error: ElefantBranchError::InvalidPostgresVersionResponse,
            },
        ]);

        assert_eq!(
            error.to_string(),
            "Cleanup failed for 2 objects: trigger users_redirect_insert_trigger: Branch a does not exist; schema a: Postgres did not respond with a version when asked for one"
        );
    }

    #[test]
    fn clone_failure_names_table_and_step() {
        let error = ElefantBranchError::TableCloneFailed {
            table: "users".to_string(),
            step: "create the delta tables",
            source: Box::new(ElefantBranchError::CounterColumnConflict {
                table: "users".to_string(),
                column: "rid".to_string(),
            }),
        };

        assert_eq!(
            error.to_string(),
            "Failed to create the delta tables for table users: Table users already has a column named rid, which is needed to track requests"
        );
        assert!(error.sql_state().is_none());
    }
}
