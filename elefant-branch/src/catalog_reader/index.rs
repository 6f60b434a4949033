use tokio_postgres::Row;
use crate::catalog_reader::define_catalog_query;
use crate::models::Index;
use crate::postgres_client_wrapper::FromRow;

pub struct IndexResult {
    pub table_name: String,
    pub index_name: String,
    pub definition: String,
    pub is_primary_key: bool,
    pub column_names: Vec<String>,
    pub predicate: Option<String>,
}

impl FromRow for IndexResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(IndexResult {
            table_name: row.try_get(0)?,
            index_name: row.try_get(1)?,
            definition: row.try_get(2)?,
            is_primary_key: row.try_get(3)?,
            column_names: row.try_get(4)?,
            predicate: row.try_get(5)?,
        })
    }
}

impl IndexResult {
    pub fn to_index(&self) -> Index {
        Index {
            name: self.index_name.clone(),
            definition: self.definition.clone(),
            is_unique: Index::definition_is_unique(&self.definition),
            is_primary_key: self.is_primary_key,
            column_names: self.column_names.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

// Expression indices report no columns at all, a partial list would be wrong to enforce.
//language=postgresql
define_catalog_query!(get_indices, IndexResult, r#"
select table_class.relname::text                         as table_name,
       index_class.relname::text                         as index_name,
       pg_get_indexdef(i.indexrelid)                     as definition,
       i.indisprimary                                    as is_primary_key,
       case
           when 0 = any (i.indkey::int2[]) then array []::text[]
           else array(select a.attname::text
                      from unnest(i.indkey::int2[]) with ordinality k(attnum, position)
                               join pg_attribute a on a.attrelid = i.indrelid and a.attnum = k.attnum
                      where k.position <= i.indnkeyatts
                      order by k.position)
           end                                           as column_names,
       pg_get_expr(i.indpred, i.indrelid)                as predicate
from pg_index i
         join pg_class table_class on table_class.oid = i.indrelid
         join pg_class index_class on index_class.oid = i.indexrelid
         join pg_namespace n on n.oid = table_class.relnamespace
where n.nspname = {schema}
  and table_class.relkind = 'r'
order by table_class.relname, index_class.relname;
"#);
