use serde::Serialize;
use crate::ElefantBranchError;
use crate::postgres_client_wrapper::FromPgChar;

/// A trigger installed on a table or view, together with the source of the function it runs.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize)]
pub struct Trigger {
    pub name: String,
    pub table_name: String,
    pub event: TriggerEvent,
    pub timing: TriggerTiming,
    pub level: TriggerLevel,
    pub function_schema: String,
    pub function_name: String,
    pub function_source: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize)]
pub enum TriggerEvent {
    #[default]
    Insert,
    Update,
    Delete,
    Truncate,
}

impl TriggerEvent {
    pub fn as_sql(&self) -> &'static str {
        match self {
            TriggerEvent::Insert => "insert",
            TriggerEvent::Update => "update",
            TriggerEvent::Delete => "delete",
            TriggerEvent::Truncate => "truncate",
        }
    }
}

impl FromPgChar for TriggerEvent {
    fn from_pg_char(c: char) -> Result<Self, ElefantBranchError> {
        match c {
            'i' => Ok(TriggerEvent::Insert),
            'u' => Ok(TriggerEvent::Update),
            'd' => Ok(TriggerEvent::Delete),
            't' => Ok(TriggerEvent::Truncate),
            _ => Err(ElefantBranchError::UnknownTriggerValue(c.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize)]
pub enum TriggerTiming {
    Before,
    #[default]
    After,
    InsteadOf,
}

impl FromPgChar for TriggerTiming {
    fn from_pg_char(c: char) -> Result<Self, ElefantBranchError> {
        match c {
            'b' => Ok(TriggerTiming::Before),
            'a' => Ok(TriggerTiming::After),
            'i' => Ok(TriggerTiming::InsteadOf),
            _ => Err(ElefantBranchError::UnknownTriggerValue(c.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize)]
pub enum TriggerLevel {
    #[default]
    Row,
    Statement,
}

impl FromPgChar for TriggerLevel {
    fn from_pg_char(c: char) -> Result<Self, ElefantBranchError> {
        match c {
            'r' => Ok(TriggerLevel::Row),
            's' => Ok(TriggerLevel::Statement),
            _ => Err(ElefantBranchError::UnknownTriggerValue(c.to_string())),
        }
    }
}
