use serde::Serialize;

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize)]
pub struct Rule {
    pub name: String,
    pub table_name: String,
    /// The `create rule` statement, as reported by `pg_rules`.
    pub definition: String,
}
