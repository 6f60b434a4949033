use itertools::Itertools;
use crate::models::{ClonedTable, Table, TableKey};
use crate::quoting::{AttemptedKeywordUsage, IdentifierQuoter, QuotableIter};

/// The view that shows the table as the branch sees it: the snapshot with the plus rows
/// added and the minus rows taken away.
pub(crate) fn create_view_sql(table: &Table, cloned: &ClonedTable, quoter: &IdentifierQuoter) -> String {
    let columns = table
        .column_names()
        .quote(quoter, AttemptedKeywordUsage::ColumnName)
        .collect_vec();
    let column_list = columns.join(", ");

    let view = quoter.quote_qualified(&cloned.view.schema_name, &cloned.view.name);
    let snapshot = quoter.quote_qualified(&table.schema_name, &table.name);
    let plus = quoter.quote_qualified(&cloned.plus.schema_name, &cloned.plus.name);
    let minus = quoter.quote_qualified(&cloned.minus.schema_name, &cloned.minus.name);

    match table.key {
        TableKey::Keyed { .. } => format!(
            r#"create view {view} as
select {column_list}
from (select {column_list} from {snapshot} union all select {column_list} from {plus}) data
where not exists (select 1 from {minus} m where ({data_columns}) is not distinct from ({minus_columns}));"#,
            data_columns = prefixed(&columns, "data"),
            minus_columns = prefixed(&columns, "m"),
        ),
        // Rows can repeat, so the n-th deleted copy of a row cancels the n-th copy that exists.
        TableKey::Unkeyed => format!(
            r#"create view {view} as
with numbered_data as (select {column_list}, row_number() over (partition by {column_list} order by {column_list}) as rn
                       from (select {column_list} from {snapshot} union all select {column_list} from {plus}) data),
     numbered_minus as (select {column_list}, row_number() over (partition by {column_list} order by {column_list}) as rn
                        from {minus})
select {d_columns}
from numbered_data d
         left join numbered_minus m on ({d_columns}) is not distinct from ({m_columns}) and d.rn = m.rn
where m.rn is null;"#,
            d_columns = prefixed(&columns, "d"),
            m_columns = prefixed(&columns, "m"),
        ),
    }
}

fn prefixed(quoted_columns: &[String], alias: &str) -> String {
    quoted_columns.iter().map(|c| format!("{alias}.{c}")).join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch_ddl::describe_clone;
    use crate::models::Column;
    use crate::default;
    use indoc::indoc;

    fn users(key: TableKey) -> Table {
        let mut table = Table::new("public", "users");
        for name in ["username", "accountid"] {
            table.columns.insert(name.to_string(), Column { name: name.to_string(), data_type: "text".to_string(), ..default() });
        }
        table.key = key;
        table
    }

    fn cloned(table: &Table, quoter: &IdentifierQuoter) -> ClonedTable {
        describe_clone(table, "branch_a", quoter)
    }

    #[test]
    fn keyed_view_filters_deleted_tuples() {
        let quoter = IdentifierQuoter::empty();
        let table = users(TableKey::Keyed { columns: vec!["accountid".to_string()] });
        let sql = create_view_sql(&table, &cloned(&table, &quoter), &quoter);

        assert_eq!(
            sql,
            indoc! {r#"
            create view branch_a.users as
            select accountid, username
            from (select accountid, username from public.users union all select accountid, username from branch_a.usersplus) data
            where not exists (select 1 from branch_a.usersminus m where (data.accountid, data.username) is not distinct from (m.accountid, m.username));"#}
        );
    }

    #[test]
    fn unkeyed_view_cancels_rows_one_by_one() {
        let quoter = IdentifierQuoter::empty();
        let table = users(TableKey::Unkeyed);
        let sql = create_view_sql(&table, &cloned(&table, &quoter), &quoter);

        assert_eq!(
            sql,
            indoc! {r#"
            create view branch_a.users as
            with numbered_data as (select accountid, username, row_number() over (partition by accountid, username order by accountid, username) as rn
                                   from (select accountid, username from public.users union all select accountid, username from branch_a.usersplus) data),
                 numbered_minus as (select accountid, username, row_number() over (partition by accountid, username order by accountid, username) as rn
                                    from branch_a.usersminus)
            select d.accountid, d.username
            from numbered_data d
                     left join numbered_minus m on (d.accountid, d.username) is not distinct from (m.accountid, m.username) and d.rn = m.rn
            where m.rn is null;"#}
        );
    }
}
