use serde::Serialize;

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize)]
pub struct Index {
    pub name: String,
    /// The full `create index` statement, as reported by Postgres.
    pub definition: String,
    pub is_unique: bool,
    /// What Postgres itself considers the primary key.
    pub is_primary_key: bool,
    /// Only filled for indices over plain columns, expression indices have none.
    pub column_names: Vec<String>,
    pub predicate: Option<String>,
}

impl Index {
    /// Uniqueness as written in the index definition.
    pub fn definition_is_unique(definition: &str) -> bool {
        definition.to_lowercase().contains("unique")
    }

    /// If rows can be checked against this index by comparing plain column values.
    pub fn is_enforceable_unique(&self) -> bool {
        self.is_unique && !self.column_names.is_empty() && self.predicate.is_none()
    }

    /// The primary key as guessed from the name Postgres gives primary key indices.
    pub fn looks_like_primary_key(&self) -> bool {
        self.is_unique && self.name.to_lowercase().contains("pkey")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default;

    #[test]
    fn uniqueness_from_definition() {
        assert!(Index::definition_is_unique("CREATE UNIQUE INDEX users_pkey ON public.users USING btree (accountid)"));
        assert!(!Index::definition_is_unique("CREATE INDEX idx_username ON public.users USING btree (username)"));
    }

    #[test]
    fn primary_key_by_name() {
        let index = Index {
            name: "users_PKEY".to_string(),
            is_unique: true,
            column_names: vec!["accountid".to_string()],
            ..default()
        };
        assert!(index.looks_like_primary_key());

        let not_unique = Index {
            is_unique: false,
            ..index.clone()
        };
        assert!(!not_unique.looks_like_primary_key());
    }

    #[test]
    fn expression_indices_are_not_enforced() {
        let index = Index {
            name: "lower_name".to_string(),
            is_unique: true,
            ..default()
        };
        assert!(!index.is_enforceable_unique());
    }
}
