use tokio_postgres::Row;
use crate::catalog_reader::define_catalog_query;
use crate::models::Rule;
use crate::postgres_client_wrapper::FromRow;

pub struct RuleResult {
    pub table_name: String,
    pub rule_name: String,
    pub definition: String,
}

impl FromRow for RuleResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(RuleResult {
            table_name: row.try_get(0)?,
            rule_name: row.try_get(1)?,
            definition: row.try_get(2)?,
        })
    }
}

impl RuleResult {
    pub fn to_rule(&self) -> Rule {
        Rule {
            name: self.rule_name.clone(),
            table_name: self.table_name.clone(),
            definition: self.definition.clone(),
        }
    }
}

//language=postgresql
define_catalog_query!(get_rules, RuleResult, r#"
select tablename::text,
       rulename::text,
       definition
from pg_rules
where schemaname = {schema}
order by tablename, rulename;
"#);
