use tokio_postgres::Row;
use tracing::instrument;
use crate::catalog_reader::CatalogReader;
use crate::models::{Trigger, TriggerEvent, TriggerLevel, TriggerTiming};
use crate::postgres_client_wrapper::{FromRow, RowEnumExt};
use crate::quoting::quote_value_string;

pub struct TriggerResult {
    pub name: String,
    pub table_name: String,
    pub event: TriggerEvent,
    pub timing: TriggerTiming,
    pub level: TriggerLevel,
    pub function_schema: String,
    pub function_name: String,
    pub function_source: String,
}

impl FromRow for TriggerResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(TriggerResult {
            name: row.try_get(0)?,
            table_name: row.try_get(1)?,
            event: row.try_get_enum_value(2)?,
            timing: row.try_get_enum_value(3)?,
            level: row.try_get_enum_value(4)?,
            function_schema: row.try_get(5)?,
            function_name: row.try_get(6)?,
            function_source: row.try_get(7)?,
        })
    }
}

impl CatalogReader<'_> {
    /// Lists the triggers on a table or view of the configured schema, one entry per event.
    #[instrument(skip_all, fields(table = relation_name))]
    pub async fn read_triggers(&self, relation_name: &str) -> crate::Result<Vec<Trigger>> {
        //language=postgresql
        let sql = format!(r#"
select t.tgname::text        as trigger_name,
       c.relname::text       as table_name,
       em.char::"char"       as event,
       case t.tgtype::integer & 66
           when 2 then 'b'
           when 64 then 'i'
           else 'a'
           end::"char"       as trigger_timing,
       case t.tgtype::integer & 1
           when 1 then 'r'
           else 's'
           end::"char"       as trigger_level,
       proc_ns.nspname::text as function_schema,
       proc.proname::text    as function_name,
       proc.prosrc           as function_source
from pg_trigger t
         join pg_class c on t.tgrelid = c.oid
         join pg_namespace n on n.oid = c.relnamespace
         join (values (4, 'i'), (8, 'd'), (16, 'u'), (32, 't')) em(num, char) on (t.tgtype & em.num) <> 0
         join pg_proc proc on t.tgfoid = proc.oid
         join pg_namespace proc_ns on proc_ns.oid = proc.pronamespace
where not t.tgisinternal
  and n.nspname = {}
  and c.relname = {}
order by t.tgname, em.num;
"#, quote_value_string(&self.options.schema), quote_value_string(relation_name));

        let rows = self.connection.get_results::<TriggerResult>(&sql).await?;

        Ok(rows
            .into_iter()
            .map(|row| Trigger {
                name: row.name,
                table_name: row.table_name,
                event: row.event,
                timing: row.timing,
                level: row.level,
                function_schema: row.function_schema,
                function_name: row.function_name,
                function_source: row.function_source,
            })
            .collect())
    }
}
