use std::collections::BTreeMap;
use serde::Serialize;
use crate::models::column::Column;
use crate::models::rule::Rule;

/// The view that stands in for a table while it is branched.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize)]
pub struct View {
    pub schema_name: String,
    pub name: String,
    /// Always nullable, the view itself enforces nothing.
    pub columns: BTreeMap<String, Column>,
    pub rules: Vec<Rule>,
}

impl View {
    /// If both views expose the same columns with the same types.
    pub fn has_same_columns(&self, other: &View) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .values()
                .zip(other.columns.values())
                .all(|(a, b)| a.has_same_shape(b))
    }
}
