use tokio_postgres::Row;
use crate::catalog_reader::define_catalog_query;
use crate::models::{ForeignKeyConstraint, ReferenceAction};
use crate::postgres_client_wrapper::{FromRow, RowEnumExt};

pub struct ForeignKeyResult {
    pub constraint_name: String,
    pub table_name: String,
    pub column_names: Vec<String>,
    pub referenced_schema_name: String,
    pub referenced_table_name: String,
    pub referenced_column_names: Vec<String>,
    pub update_action: ReferenceAction,
    pub delete_action: ReferenceAction,
}

impl FromRow for ForeignKeyResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(ForeignKeyResult {
            constraint_name: row.try_get(0)?,
            table_name: row.try_get(1)?,
            column_names: row.try_get(2)?,
            referenced_schema_name: row.try_get(3)?,
            referenced_table_name: row.try_get(4)?,
            referenced_column_names: row.try_get(5)?,
            update_action: row.try_get_enum_value(6)?,
            delete_action: row.try_get_enum_value(7)?,
        })
    }
}

impl ForeignKeyResult {
    pub fn to_constraint(self) -> ForeignKeyConstraint {
        ForeignKeyConstraint {
            name: self.constraint_name,
            table_name: self.table_name,
            column_names: self.column_names,
            referenced_schema_name: self.referenced_schema_name,
            referenced_table_name: self.referenced_table_name,
            referenced_column_names: self.referenced_column_names,
            update_action: self.update_action,
            delete_action: self.delete_action,
        }
    }
}

//language=postgresql
define_catalog_query!(get_foreign_keys, ForeignKeyResult, r#"
select con.conname::text                                                       as constraint_name,
       cl.relname::text                                                        as table_name,
       array(select a.attname::text
             from unnest(con.conkey) with ordinality k(attnum, position)
                      join pg_attribute a on a.attrelid = con.conrelid and a.attnum = k.attnum
             order by k.position)                                              as column_names,
       referenced_ns.nspname::text                                             as referenced_schema_name,
       referenced_cl.relname::text                                             as referenced_table_name,
       array(select a.attname::text
             from unnest(con.confkey) with ordinality k(attnum, position)
                      join pg_attribute a on a.attrelid = con.confrelid and a.attnum = k.attnum
             order by k.position)                                              as referenced_column_names,
       con.confupdtype                                                         as update_action,
       con.confdeltype                                                         as delete_action
from pg_constraint con
         join pg_class cl on cl.oid = con.conrelid
         join pg_namespace n on n.oid = cl.relnamespace
         join pg_class referenced_cl on referenced_cl.oid = con.confrelid
         join pg_namespace referenced_ns on referenced_ns.oid = referenced_cl.relnamespace
where con.contype = 'f'
  and n.nspname = {schema}
order by cl.relname, con.conname;
"#);
