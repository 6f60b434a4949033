use serde::Serialize;
use crate::quoting::IdentifierQuoter;

pub(crate) const COUNTER_TABLE_NAME: &str = "rid";
pub(crate) const COUNTER_VALUE_COLUMN: &str = "id";
pub(crate) const REQUEST_ID_COLUMN: &str = "rid";

/// The request counter of one branch.
///
/// The counter table `<namespace>.rid` holds a single row with the current request id in `id`,
/// and every row written to a delta table is stamped with it in the `rid` column.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Counter {
    pub schema_name: String,
    pub table_name: String,
    pub value_column: String,
    /// The column of the delta tables that records the request id.
    pub request_id_column: String,
}

impl Counter {
    pub fn new(namespace: &str) -> Self {
        Counter {
            schema_name: namespace.to_string(),
            table_name: COUNTER_TABLE_NAME.to_string(),
            value_column: COUNTER_VALUE_COLUMN.to_string(),
            request_id_column: REQUEST_ID_COLUMN.to_string(),
        }
    }

    pub fn qualified_table(&self, quoter: &IdentifierQuoter) -> String {
        quoter.quote_qualified(&self.schema_name, &self.table_name)
    }
}
