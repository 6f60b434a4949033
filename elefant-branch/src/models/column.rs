use serde::Serialize;

#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize)]
pub struct Column {
    pub name: String,
    pub ordinal_position: i32,
    /// The declared type, without any length bound.
    pub data_type: String,
    pub character_maximum_length: Option<i32>,
    pub is_nullable: bool,
    /// The default expression, if the column has one that is not an identity.
    pub default_value: Option<String>,
    pub generator: Option<ValueGenerator>,
}

impl Column {
    /// The type as it should be written in a column definition, such as `character varying(12)`.
    pub fn type_definition(&self) -> String {
        match self.character_maximum_length {
            Some(length) => format!("{}({})", self.data_type, length),
            None => self.data_type.clone(),
        }
    }

    /// If the column is filled in automatically when an insert leaves it out.
    pub fn is_generated(&self) -> bool {
        self.generator.is_some()
    }

    /// Two columns hold the same kind of values, regardless of constraints and defaults.
    pub fn has_same_shape(&self, other: &Column) -> bool {
        self.name == other.name
            && self.data_type == other.data_type
            && self.character_maximum_length == other.character_maximum_length
    }
}

/// How values are generated for a column when they are not given explicitly.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub enum ValueGenerator {
    Identity(IdentityColumn),
    /// A `serial` style column, with a default of `nextval(...)`.
    Sequence {
        default_expression: String,
    },
}

impl ValueGenerator {
    pub fn increment(&self) -> i64 {
        match self {
            ValueGenerator::Identity(identity) => identity.increment,
            ValueGenerator::Sequence { .. } => 1,
        }
    }

    /// The value numbering counts up from when the table is empty.
    pub fn minimum(&self) -> i64 {
        match self {
            ValueGenerator::Identity(identity) => identity.minimum,
            ValueGenerator::Sequence { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct IdentityColumn {
    pub generation: IdentityGeneration,
    pub start: i64,
    pub increment: i64,
    pub minimum: i64,
    pub maximum: i64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub enum IdentityGeneration {
    Always,
    ByDefault,
}
