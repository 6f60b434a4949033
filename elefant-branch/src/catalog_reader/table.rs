use tokio_postgres::Row;
use crate::catalog_reader::define_catalog_query;
use crate::postgres_client_wrapper::FromRow;

pub struct TableResult {
    pub name: String,
}

impl FromRow for TableResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(TableResult {
            name: row.try_get(0)?,
        })
    }
}

//language=postgresql
define_catalog_query!(get_tables, TableResult, r#"
select c.relname::text
from pg_class c
         join pg_namespace n on n.oid = c.relnamespace
where n.nspname = {schema}
  and c.relkind = 'r'
  and not c.relispartition
order by c.relname;
"#);
