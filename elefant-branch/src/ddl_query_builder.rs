use crate::quoting::{AttemptedKeywordUsage, IdentifierQuoter};

/// Builds `create table` statements.
pub struct DdlQueryBuilder<'q> {
    sql: String,
    identifier_quoter: &'q IdentifierQuoter,
}

impl<'a> DdlQueryBuilder<'a> {
    pub fn new(identifier_quoter: &'a IdentifierQuoter) -> Self {
        Self {
            sql: String::new(),
            identifier_quoter,
        }
    }

    pub fn create_table(&mut self, schema: &str, table: &str) -> DdlTableBuilder<'a, '_> {
        self.sql.push_str(&format!(
            "create table {} (",
            self.identifier_quoter.quote_qualified(schema, table)
        ));

        DdlTableBuilder {
            query_builder: self,
            has_first_line: false,
        }
    }

    pub fn build(mut self) -> String {
        self.sql.push_str("\n);");

        self.sql
    }
}

pub struct DdlTableBuilder<'q, 'b> {
    query_builder: &'b mut DdlQueryBuilder<'q>,
    has_first_line: bool,
}

impl<'a, 'q> DdlTableBuilder<'a, 'q> {
    pub fn column<'b>(&'b mut self, name: &str, data_type: &str) -> DdlTableColumnBuilder<'b> {
        let name = self
            .query_builder
            .identifier_quoter
            .quote(name, AttemptedKeywordUsage::ColumnName);
        self.start_new_line();
        self.query_builder
            .sql
            .push_str(&format!("    {} {}", name, data_type));

        DdlTableColumnBuilder {
            sql: &mut self.query_builder.sql,
        }
    }

    fn start_new_line(&mut self) {
        if self.has_first_line {
            self.query_builder.sql.push_str(",\n")
        } else {
            self.query_builder.sql.push('\n');
            self.has_first_line = true;
        }
    }
}

pub struct DdlTableColumnBuilder<'a> {
    sql: &'a mut String,
}

impl<'a> DdlTableColumnBuilder<'a> {
    pub fn not_null(&mut self) -> &mut Self {
        self.sql.push_str(" not null");

        self
    }
}
