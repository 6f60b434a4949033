use itertools::Itertools;
use serde::Serialize;
use tracing::{instrument, warn};
use crate::diff::scratch::{AsyncCleanup, ScratchViews};
use crate::models::*;
use crate::postgres_client_wrapper::PostgresClientWrapper;
use crate::quoting::{AttemptedKeywordUsage, IdentifierQuoter, QuotableIter};
use crate::{ElefantBranchError, Result};

mod keyed;
mod scratch;
mod unkeyed;

/// The values of one row, in column name order, as Postgres prints them.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(pub Vec<Option<String>>);

impl Row {
    /// Stands in for a row that is not there.
    pub fn nil(width: usize) -> Self {
        Row(vec![None; width])
    }

    pub fn is_nil(&self) -> bool {
        self.0.iter().all(|v| v.is_none())
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.0
    }
}

/// How the rows of one table differ between two branches and the state they both started from.
///
/// The three sequences line up: position `i` of each describes the same row.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize)]
pub struct Diff {
    pub column_names: Vec<String>,
    /// The row as the first branch left it.
    pub control: Vec<Row>,
    /// The row as it was before either branch touched it.
    pub baseline: Vec<Row>,
    /// The row as the second branch left it.
    pub experimental: Vec<Row>,
}

impl Diff {
    pub fn len(&self) -> usize {
        self.control.len()
    }

    pub fn is_empty(&self) -> bool {
        self.control.is_empty()
    }

    fn width(&self) -> usize {
        self.column_names.len()
    }
}

/// Diffs the delta tables of two branches.
pub struct DbDiff<'a> {
    connection: &'a PostgresClientWrapper,
    quoter: &'a IdentifierQuoter,
    request_id_column: String,
}

/// The relations a diff reads from, restricted to the compared columns and the requests up to N.
struct DiffInputs {
    columns: Vec<String>,
    a_plus: String,
    a_minus: String,
    b_plus: String,
    b_minus: String,
}

impl<'a> DbDiff<'a> {
    pub fn new(connection: &'a PostgresClientWrapper, quoter: &'a IdentifierQuoter, request_id_column: &str) -> Self {
        DbDiff {
            connection,
            quoter,
            request_id_column: request_id_column.to_string(),
        }
    }

    /// Diffs the same table in two branches, looking only at requests up to and including `n`.
    #[instrument(skip_all, fields(table = %a.name, n))]
    pub async fn diff_tables_at_n(
        &self,
        a: &ClonedTable,
        b: &ClonedTable,
        n: i64,
        skip_columns: &[String],
    ) -> Result<Diff> {
        if !a.view.has_same_columns(&b.view) {
            return Err(ElefantBranchError::ColumnMismatch {
                left: format!("{}.{}", a.counter.schema_name, a.name),
                right: format!("{}.{}", b.counter.schema_name, b.name),
            });
        }

        let column_names = a
            .view
            .columns
            .keys()
            .filter(|c| !skip_columns.contains(c))
            .cloned()
            .collect_vec();

        let diff = Diff {
            column_names,
            ..Diff::default()
        };

        if diff.column_names.is_empty() {
            return Ok(diff);
        }

        let key = a.snapshot.key.without_columns(skip_columns);

        let mut scratch = ScratchViews::new(self.quoter);
        let result = self.diff_with_scratch(&mut scratch, a, b, n, &key, diff).await;
        let cleanup = scratch.cleanup(self.connection).await;

        match (result, cleanup) {
            (Ok(diff), Ok(())) => Ok(diff),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Err(cleanup_error)) => {
                warn!(error = %cleanup_error, "Scratch views were left behind after a failed diff");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        }
    }

    async fn diff_with_scratch(
        &self,
        scratch: &mut ScratchViews<'_>,
        a: &ClonedTable,
        b: &ClonedTable,
        n: i64,
        key: &TableKey,
        diff: Diff,
    ) -> Result<Diff> {
        let columns = diff
            .column_names
            .iter()
            .quote(self.quoter, AttemptedKeywordUsage::ColumnName)
            .collect_vec();
        let column_list = columns.join(", ");

        let as_of = |delta: &Table| {
            format!(
                "select {} from {} where {} <= {}",
                column_list,
                self.quoter.quote_qualified(&delta.schema_name, &delta.name),
                self.quoter.quote(&self.request_id_column, AttemptedKeywordUsage::ColumnName),
                n
            )
        };

        let a_plus = scratch.create(self.connection, "a_plus", &as_of(&a.plus)).await?;
        let a_minus = scratch.create(self.connection, "a_minus", &as_of(&a.minus)).await?;
        let b_plus = scratch.create(self.connection, "b_plus", &as_of(&b.plus)).await?;
        let b_minus = scratch.create(self.connection, "b_minus", &as_of(&b.minus)).await?;

        // A row that was both added and removed in the same branch cancels out.
        let trim = |left: &str, right: &str| {
            format!("select {column_list} from {left} except all select {column_list} from {right}")
        };

        let inputs = DiffInputs {
            a_plus: scratch.create(self.connection, "a_plus_trim", &trim(&a_plus, &a_minus)).await?,
            a_minus: scratch.create(self.connection, "a_minus_trim", &trim(&a_minus, &a_plus)).await?,
            b_plus: scratch.create(self.connection, "b_plus_trim", &trim(&b_plus, &b_minus)).await?,
            b_minus: scratch.create(self.connection, "b_minus_trim", &trim(&b_minus, &b_plus)).await?,
            columns,
        };

        match key {
            TableKey::Keyed { columns: key_columns } => {
                keyed::diff_keyed(self, scratch, &inputs, key_columns, diff, &a.name).await
            }
            TableKey::Unkeyed => unkeyed::diff_unkeyed(self, &inputs, diff).await,
        }
    }

    async fn read_rows(&self, sql: &str, width: usize) -> Result<Vec<Row>> {
        let rows = self.connection.get_text_rows(sql).await?;
        rows_of_width(rows, width)
    }
}

/// Wraps the values of each row, failing if a row does not have exactly `width` values.
fn rows_of_width(rows: Vec<Vec<Option<String>>>, width: usize) -> Result<Vec<Row>> {
    rows.into_iter()
        .map(|values| {
            if values.len() == width {
                Ok(Row(values))
            } else {
                Err(ElefantBranchError::InvalidNumberOfResults {
                    actual: values.len(),
                    expected: width,
                })
            }
        })
        .collect()
}
