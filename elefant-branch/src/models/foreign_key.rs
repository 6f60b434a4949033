use serde::Serialize;
use crate::ElefantBranchError;
use crate::postgres_client_wrapper::FromPgChar;

/// A foreign key, owned by the referencing table.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ForeignKeyConstraint {
    pub name: String,
    pub table_name: String,
    pub column_names: Vec<String>,
    pub referenced_schema_name: String,
    pub referenced_table_name: String,
    /// Positionally matches `column_names`.
    pub referenced_column_names: Vec<String>,
    pub update_action: ReferenceAction,
    pub delete_action: ReferenceAction,
}

impl ForeignKeyConstraint {
    pub fn is_self_reference(&self) -> bool {
        self.table_name == self.referenced_table_name
    }

    pub(crate) fn to_reference(&self) -> Reference {
        Reference {
            constraint_name: self.name.clone(),
            referencing_table_name: self.table_name.clone(),
            referencing_column_names: self.column_names.clone(),
            column_names: self.referenced_column_names.clone(),
            update_action: self.update_action,
            delete_action: self.delete_action,
        }
    }
}

/// The other side of a foreign key, attached to the referenced table.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Reference {
    pub constraint_name: String,
    pub referencing_table_name: String,
    pub referencing_column_names: Vec<String>,
    /// The columns of the referenced table, positionally matching `referencing_column_names`.
    pub column_names: Vec<String>,
    pub update_action: ReferenceAction,
    pub delete_action: ReferenceAction,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize)]
pub enum ReferenceAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferenceAction {
    /// If changing a referenced row should simply be refused while it is referenced.
    pub fn restricts(&self) -> bool {
        matches!(self, ReferenceAction::NoAction | ReferenceAction::Restrict)
    }
}

impl FromPgChar for ReferenceAction {
    fn from_pg_char(c: char) -> Result<Self, ElefantBranchError> {
        match c {
            'a' => Ok(ReferenceAction::NoAction),
            'r' => Ok(ReferenceAction::Restrict),
            'c' => Ok(ReferenceAction::Cascade),
            'n' => Ok(ReferenceAction::SetNull),
            'd' => Ok(ReferenceAction::SetDefault),
            _ => Err(ElefantBranchError::UnknownReferenceAction(c.to_string())),
        }
    }
}
