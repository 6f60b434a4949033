use tracing::instrument;
use crate::models::Counter;
use crate::postgres_client_wrapper::PostgresClientWrapper;
use crate::quoting::{AttemptedKeywordUsage, IdentifierQuoter};
use crate::Result;

/// Advances the counter by one and returns the new request id.
#[instrument(skip_all, fields(namespace = %counter.schema_name))]
pub(crate) async fn increment_counter(
    connection: &PostgresClientWrapper,
    quoter: &IdentifierQuoter,
    counter: &Counter,
) -> Result<i64> {
    let value_column = quoter.quote(&counter.value_column, AttemptedKeywordUsage::ColumnName);
    let sql = format!(
        "update {table} set {value_column} = {value_column} + 1 returning {value_column};",
        table = counter.qualified_table(quoter),
    );

    connection.get_single_result(&sql).await
}

pub(crate) async fn read_counter(
    connection: &PostgresClientWrapper,
    quoter: &IdentifierQuoter,
    counter: &Counter,
) -> Result<i64> {
    let sql = format!(
        "select {} from {};",
        quoter.quote(&counter.value_column, AttemptedKeywordUsage::ColumnName),
        counter.qualified_table(quoter),
    );

    connection.get_single_result(&sql).await
}
