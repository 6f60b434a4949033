use tracing::{info, instrument, warn};
use crate::branch_ddl::{BRANCH_SCHEMA_COMMENT, SNAPSHOT_SUFFIX};
use crate::postgres_client_wrapper::PostgresClientWrapper;
use crate::quoting::{quote_value_string, AttemptedKeywordUsage, IdentifierQuoter};
use crate::{CleanupFailure, ElefantBranchError, Result};

/// Undoes whatever an earlier, crashed run left behind in `schema`.
///
/// Tables renamed to `<table>snapshot` get their name back, after dropping any branch view
/// still standing in front of them, and every branch schema is dropped.
#[instrument(skip_all, fields(schema = schema))]
pub(crate) async fn restore_stale_state(
    connection: &PostgresClientWrapper,
    quoter: &IdentifierQuoter,
    schema: &str,
) -> Result {
    let mut failures = Vec::new();

    for snapshot in stale_snapshots(connection, schema).await? {
        let Some(original) = snapshot.strip_suffix(SNAPSHOT_SUFFIX) else {
            continue;
        };

        if let Err(error) = restore_snapshot(connection, quoter, schema, &snapshot, original).await {
            failures.push(CleanupFailure {
                object: format!("table {schema}.{snapshot}"),
                error,
            });
        }
    }

    for namespace in branch_schemas(connection).await? {
        info!(namespace = %namespace, "Dropping stale branch schema");
        let sql = format!(
            "drop schema {} cascade;",
            quoter.quote(&namespace, AttemptedKeywordUsage::Other)
        );
        if let Err(error) = connection.execute_non_query(&sql).await {
            failures.push(CleanupFailure {
                object: format!("schema {namespace}"),
                error,
            });
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ElefantBranchError::CleanupFailed(failures))
    }
}

async fn restore_snapshot(
    connection: &PostgresClientWrapper,
    quoter: &IdentifierQuoter,
    schema: &str,
    snapshot: &str,
    original: &str,
) -> Result {
    let occupant_sql = format!(
        "select c.relkind::text from pg_class c join pg_namespace n on n.oid = c.relnamespace where n.nspname = {} and c.relname = {};",
        quote_value_string(schema),
        quote_value_string(original)
    );
    let occupant = connection.get_single_results::<String>(&occupant_sql).await?;

    match occupant.first().map(|k| k.as_str()) {
        Some("v") => {
            connection
                .execute_non_query(&format!("drop view {} cascade;", quoter.quote_qualified(schema, original)))
                .await?;
        }
        Some(_) => {
            warn!(table = original, "Cannot restore the snapshot of the table, another relation has taken its name");
            return Ok(());
        }
        None => {}
    }

    info!(table = original, "Restoring stale snapshot");
    let sql = format!(
        "alter table {} rename to {};",
        quoter.quote_qualified(schema, snapshot),
        quoter.quote(original, AttemptedKeywordUsage::Other)
    );

    connection.execute_non_query(&sql).await
}

/// Snapshot tables that still have a matching plus table in some branch schema.
async fn stale_snapshots(connection: &PostgresClientWrapper, schema: &str) -> Result<Vec<String>> {
    //language=postgresql
    let sql = format!(
        r#"
select c.relname::text
from pg_class c
         join pg_namespace n on n.oid = c.relnamespace
where n.nspname = {schema}
  and c.relkind = 'r'
  and c.relname like '%' || {suffix}
  and exists (select 1
              from pg_class plus
                       join pg_namespace plus_ns on plus_ns.oid = plus.relnamespace
                       join pg_description d on d.objoid = plus_ns.oid and d.classoid = 'pg_namespace'::regclass
              where d.description = {comment}
                and plus.relname = left(c.relname, -length({suffix})) || 'plus')
order by c.relname;
"#,
        schema = quote_value_string(schema),
        suffix = quote_value_string(SNAPSHOT_SUFFIX),
        comment = quote_value_string(BRANCH_SCHEMA_COMMENT),
    );

    connection.get_single_results(&sql).await
}

async fn branch_schemas(connection: &PostgresClientWrapper) -> Result<Vec<String>> {
    //language=postgresql
    let sql = format!(
        r#"
select n.nspname::text
from pg_namespace n
         join pg_description d on d.objoid = n.oid and d.classoid = 'pg_namespace'::regclass
where d.description = {}
order by n.nspname;
"#,
        quote_value_string(BRANCH_SCHEMA_COMMENT)
    );

    connection.get_single_results(&sql).await
}
