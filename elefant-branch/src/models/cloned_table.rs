use serde::Serialize;
use crate::models::counter::Counter;
use crate::models::table::Table;
use crate::models::view::View;

/// Everything created in a branch for one table.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ClonedTable {
    /// The name the application knows the table by.
    pub name: String,
    pub snapshot: Table,
    pub plus: Table,
    pub minus: Table,
    pub view: View,
    pub counter: Counter,
    /// Generated functions, all in the branch schema.
    pub functions: Vec<String>,
    pub triggers: Vec<String>,
    pub phase: ClonePhase,
}

/// How far the branching of a table got. Teardown undoes exactly the steps that were reached.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Default, Serialize)]
pub enum ClonePhase {
    #[default]
    Pending,
    DeltaTablesCreated,
    ViewCreated,
    SnapshotRenamed,
    ViewPromoted,
    TriggersInstalled,
}
