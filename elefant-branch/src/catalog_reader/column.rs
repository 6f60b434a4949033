use tokio_postgres::Row;
use crate::catalog_reader::define_catalog_query;
use crate::models::{Column, IdentityColumn, IdentityGeneration, ValueGenerator};
use crate::postgres_client_wrapper::FromRow;
use crate::ElefantBranchError;

pub struct ColumnResult {
    pub table_name: String,
    pub column_name: String,
    pub ordinal_position: i32,
    pub data_type: String,
    pub character_maximum_length: Option<i32>,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    pub is_identity: bool,
    pub identity_generation: Option<String>,
    pub identity_start: Option<String>,
    pub identity_increment: Option<String>,
    pub identity_minimum: Option<String>,
    pub identity_maximum: Option<String>,
}

impl FromRow for ColumnResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(ColumnResult {
            table_name: row.try_get(0)?,
            column_name: row.try_get(1)?,
            ordinal_position: row.try_get(2)?,
            data_type: row.try_get(3)?,
            character_maximum_length: row.try_get(4)?,
            is_nullable: row.try_get(5)?,
            column_default: row.try_get(6)?,
            is_identity: row.try_get(7)?,
            identity_generation: row.try_get(8)?,
            identity_start: row.try_get(9)?,
            identity_increment: row.try_get(10)?,
            identity_minimum: row.try_get(11)?,
            identity_maximum: row.try_get(12)?,
        })
    }
}

impl ColumnResult {
    pub fn to_column(&self) -> crate::Result<Column> {
        let generator = if self.is_identity {
            Some(ValueGenerator::Identity(IdentityColumn {
                generation: match self.identity_generation.as_deref() {
                    Some("ALWAYS") => IdentityGeneration::Always,
                    _ => IdentityGeneration::ByDefault,
                },
                start: self.parse_identity_value("identity start", &self.identity_start)?,
                increment: self.parse_identity_value("identity increment", &self.identity_increment)?,
                minimum: self.parse_identity_value("identity minimum", &self.identity_minimum)?,
                maximum: self.parse_identity_value("identity maximum", &self.identity_maximum)?,
            }))
        } else {
            match &self.column_default {
                Some(default) if default.starts_with("nextval(") => Some(ValueGenerator::Sequence {
                    default_expression: default.clone(),
                }),
                _ => None,
            }
        };

        Ok(Column {
            name: self.column_name.clone(),
            ordinal_position: self.ordinal_position,
            data_type: self.data_type.clone(),
            character_maximum_length: self.character_maximum_length,
            is_nullable: self.is_nullable,
            default_value: if self.is_identity { None } else { self.column_default.clone() },
            generator,
        })
    }

    fn parse_identity_value(&self, field: &'static str, value: &Option<String>) -> crate::Result<i64> {
        let value = value.as_deref().unwrap_or_default();
        value.parse().map_err(|_| ElefantBranchError::CatalogParse {
            table: self.table_name.clone(),
            column: self.column_name.clone(),
            field,
            value: value.to_string(),
        })
    }
}

//language=postgresql
define_catalog_query!(get_columns, ColumnResult, r#"
select c.table_name::text,
       c.column_name::text,
       c.ordinal_position::int4,
       (case
            when c.data_type in ('USER-DEFINED', 'ARRAY') then format_type(a.atttypid, null)
            else c.data_type
           end)::text                    as data_type,
       c.character_maximum_length::int4,
       c.is_nullable = 'YES'             as is_nullable,
       c.column_default::text,
       c.is_identity = 'YES'             as is_identity,
       c.identity_generation::text,
       c.identity_start::text,
       c.identity_increment::text,
       c.identity_minimum::text,
       c.identity_maximum::text
from information_schema.columns c
         join pg_namespace n on n.nspname = c.table_schema
         join pg_class cl on cl.relnamespace = n.oid and cl.relname = c.table_name
         join pg_attribute a on a.attrelid = cl.oid and a.attname = c.column_name
where c.table_schema = {schema}
  and cl.relkind = 'r'
order by c.table_name, c.column_name;
"#);

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_row(increment: &str) -> ColumnResult {
        ColumnResult {
            table_name: "users".to_string(),
            column_name: "accountid".to_string(),
            ordinal_position: 1,
            data_type: "integer".to_string(),
            character_maximum_length: None,
            is_nullable: false,
            column_default: None,
            is_identity: true,
            identity_generation: Some("ALWAYS".to_string()),
            identity_start: Some("1".to_string()),
            identity_increment: Some(increment.to_string()),
            identity_minimum: Some("1".to_string()),
            identity_maximum: Some("2147483647".to_string()),
        }
    }

    #[test]
    fn parses_identity_metadata() {
        let column = identity_row("5").to_column().unwrap();

        assert_eq!(
            column.generator,
            Some(ValueGenerator::Identity(IdentityColumn {
                generation: IdentityGeneration::Always,
                start: 1,
                increment: 5,
                minimum: 1,
                maximum: 2147483647,
            }))
        );
    }

    #[test]
    fn unparsable_identity_names_the_column() {
        let error = identity_row("five").to_column().unwrap_err();

        match error {
            ElefantBranchError::CatalogParse { table, column, field, value } => {
                assert_eq!(table, "users");
                assert_eq!(column, "accountid");
                assert_eq!(field, "identity increment");
                assert_eq!(value, "five");
            }
            e => panic!("Expected a parse error, got {:?}", e),
        }
    }

    #[test]
    fn serial_defaults_are_sequences() {
        let row = ColumnResult {
            is_identity: false,
            identity_generation: None,
            identity_start: None,
            identity_increment: None,
            identity_minimum: None,
            identity_maximum: None,
            column_default: Some("nextval('users_accountid_seq'::regclass)".to_string()),
            ..identity_row("1")
        };

        let column = row.to_column().unwrap();
        assert!(matches!(column.generator, Some(ValueGenerator::Sequence { .. })));
        assert_eq!(column.default_value.as_deref(), Some("nextval('users_accountid_seq'::regclass)"));
    }
}
