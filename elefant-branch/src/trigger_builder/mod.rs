use tracing::{info, instrument, warn};
use crate::models::*;
use crate::postgres_client_wrapper::PostgresClientWrapper;
use crate::quoting::{AttemptedKeywordUsage, IdentifierQuoter};
use crate::{CleanupFailure, Result};

mod render;

/// A schema qualified table or view.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RelationName {
    pub schema: String,
    pub name: String,
}

impl RelationName {
    pub fn new(schema: &str, name: &str) -> Self {
        RelationName {
            schema: schema.to_string(),
            name: name.to_string(),
        }
    }

    pub fn quote(&self, quoter: &IdentifierQuoter) -> String {
        quoter.quote_qualified(&self.schema, &self.name)
    }
}

/// The row a statement works on.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RowVariable {
    New,
    Old,
}

/// One step of a generated trigger function.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TriggerStatement {
    /// Reads the current request id of the branch.
    ReadCounter {
        counter: RelationName,
        value_column: String,
    },
    /// Numbers a row that was inserted without a value for a generated column.
    AssignIdentity {
        view: RelationName,
        column: String,
        increment: i64,
        minimum: i64,
    },
    UniqueCheck {
        view: RelationName,
        columns: Vec<String>,
        /// On update, only rows that change the indexed values can collide.
        only_when_changed: bool,
    },
    /// Refuses a row whose foreign key points at nothing.
    ForeignKeyCheck {
        constraint_name: String,
        table_name: String,
        referenced: RelationName,
        columns: Vec<String>,
        referenced_columns: Vec<String>,
    },
    /// Refuses to change or remove a row that other rows still point at.
    RestrictCheck {
        constraint_name: String,
        table_name: String,
        referencing: RelationName,
        referencing_columns: Vec<String>,
        columns: Vec<String>,
        only_when_changed: bool,
    },
    InsertDelta {
        delta: RelationName,
        row: RowVariable,
        columns: Vec<String>,
        request_id_column: String,
    },
    Return(RowVariable),
}

/// A generated trigger function together with the trigger that calls it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TriggerProcedure {
    pub function: RelationName,
    pub trigger_name: String,
    /// The promoted view the trigger is installed on.
    pub view: RelationName,
    pub event: TriggerEvent,
    pub statements: Vec<TriggerStatement>,
}

/// The insert, update and delete procedures that redirect writes on the view into the delta tables.
pub(crate) fn build_procedures(cloned: &ClonedTable) -> Vec<TriggerProcedure> {
    [TriggerEvent::Insert, TriggerEvent::Update, TriggerEvent::Delete]
        .into_iter()
        .map(|event| build_procedure(cloned, event))
        .collect()
}

fn build_procedure(cloned: &ClonedTable, event: TriggerEvent) -> TriggerProcedure {
    let table = &cloned.snapshot;
    let view = RelationName::new(&table.schema_name, &cloned.name);
    let columns = table.column_names().map(str::to_string).collect::<Vec<_>>();
    let counter = &cloned.counter;

    let mut statements = vec![TriggerStatement::ReadCounter {
        counter: RelationName::new(&counter.schema_name, &counter.table_name),
        value_column: counter.value_column.clone(),
    }];

    if event == TriggerEvent::Insert {
        for column in table.generated_columns() {
            if let Some(generator) = &column.generator {
                statements.push(TriggerStatement::AssignIdentity {
                    view: view.clone(),
                    column: column.name.clone(),
                    increment: generator.increment(),
                    minimum: generator.minimum(),
                });
            }
        }
    }

    if event != TriggerEvent::Delete {
        let mut unique_indices = table.unique_indices().collect::<Vec<_>>();
        unique_indices.sort_by(|a, b| a.name.cmp(&b.name));
        for index in unique_indices {
            statements.push(TriggerStatement::UniqueCheck {
                view: view.clone(),
                columns: index.column_names.clone(),
                only_when_changed: event == TriggerEvent::Update,
            });
        }

        let mut foreign_keys = table.foreign_keys.iter().filter(|fk| !fk.is_self_reference()).collect::<Vec<_>>();
        foreign_keys.sort_by(|a, b| a.name.cmp(&b.name));
        for fk in foreign_keys {
            statements.push(TriggerStatement::ForeignKeyCheck {
                constraint_name: fk.name.clone(),
                table_name: cloned.name.clone(),
                referenced: RelationName::new(&fk.referenced_schema_name, &fk.referenced_table_name),
                columns: fk.column_names.clone(),
                referenced_columns: fk.referenced_column_names.clone(),
            });
        }
    }

    if event != TriggerEvent::Insert {
        let mut references = table.references.iter().collect::<Vec<_>>();
        references.sort_by(|a, b| a.constraint_name.cmp(&b.constraint_name));
        for reference in references {
            let action = if event == TriggerEvent::Update {
                reference.update_action
            } else {
                reference.delete_action
            };

            if !action.restricts() {
                warn!(
                    table = %cloned.name,
                    constraint = %reference.constraint_name,
                    ?action,
                    event = event.as_sql(),
                    "Only restricting foreign keys are enforced on branches, this reference is not"
                );
                continue;
            }

            statements.push(TriggerStatement::RestrictCheck {
                constraint_name: reference.constraint_name.clone(),
                table_name: cloned.name.clone(),
                referencing: RelationName::new(&table.schema_name, &reference.referencing_table_name),
                referencing_columns: reference.referencing_column_names.clone(),
                columns: reference.column_names.clone(),
                only_when_changed: event == TriggerEvent::Update,
            });
        }
    }

    let delta = |delta: &Table, row: RowVariable| TriggerStatement::InsertDelta {
        delta: RelationName::new(&delta.schema_name, &delta.name),
        row,
        columns: columns.clone(),
        request_id_column: counter.request_id_column.clone(),
    };

    match event {
        TriggerEvent::Insert => {
            statements.push(delta(&cloned.plus, RowVariable::New));
            statements.push(TriggerStatement::Return(RowVariable::New));
        }
        TriggerEvent::Update => {
            statements.push(delta(&cloned.minus, RowVariable::Old));
            statements.push(delta(&cloned.plus, RowVariable::New));
            statements.push(TriggerStatement::Return(RowVariable::New));
        }
        TriggerEvent::Delete | TriggerEvent::Truncate => {
            statements.push(delta(&cloned.minus, RowVariable::Old));
            statements.push(TriggerStatement::Return(RowVariable::Old));
        }
    }

    TriggerProcedure {
        function: RelationName::new(&counter.schema_name, &function_name(&cloned.name, event)),
        trigger_name: trigger_name(&cloned.name, event),
        view,
        event,
        statements,
    }
}

pub(crate) fn function_name(table: &str, event: TriggerEvent) -> String {
    format!("{}_redirect_{}", table, event.as_sql())
}

pub(crate) fn trigger_name(table: &str, event: TriggerEvent) -> String {
    format!("{}_trigger", function_name(table, event))
}

/// Creates the trigger functions in the branch schema and puts the triggers on the promoted view.
#[instrument(skip_all, fields(table = %cloned.name))]
pub(crate) async fn install_triggers(
    connection: &PostgresClientWrapper,
    quoter: &IdentifierQuoter,
    cloned: &mut ClonedTable,
) -> Result {
    for procedure in build_procedures(cloned) {
        let sql = format!("{}\n{}", procedure.function_sql(quoter), procedure.trigger_sql(quoter));
        connection.execute_non_query(&sql).await?;

        cloned.functions.push(procedure.function.name.clone());
        cloned.triggers.push(procedure.trigger_name.clone());
    }

    cloned.phase = ClonePhase::TriggersInstalled;
    info!(table = %cloned.name, "Triggers installed");

    Ok(())
}

/// Drops the triggers from the view and the functions from the branch schema.
#[instrument(skip_all, fields(table = %cloned.name))]
pub(crate) async fn uninstall_triggers(
    connection: &PostgresClientWrapper,
    quoter: &IdentifierQuoter,
    cloned: &mut ClonedTable,
) -> Vec<CleanupFailure> {
    let mut failures = Vec::new();
    let view = quoter.quote_qualified(&cloned.view.schema_name, &cloned.view.name);

    for trigger in std::mem::take(&mut cloned.triggers) {
        let sql = format!(
            "drop trigger if exists {} on {};",
            quoter.quote(&trigger, AttemptedKeywordUsage::Other),
            view
        );
        if let Err(error) = connection.execute_non_query(&sql).await {
            failures.push(CleanupFailure {
                object: format!("trigger {trigger}"),
                error,
            });
            cloned.triggers.push(trigger);
        }
    }

    for function in std::mem::take(&mut cloned.functions) {
        let sql = format!(
            "drop function if exists {}();",
            quoter.quote_qualified(&cloned.counter.schema_name, &function)
        );
        if let Err(error) = connection.execute_non_query(&sql).await {
            failures.push(CleanupFailure {
                object: format!("function {}.{}", cloned.counter.schema_name, function),
                error,
            });
            cloned.functions.push(function);
        }
    }

    if failures.is_empty() && cloned.phase == ClonePhase::TriggersInstalled {
        cloned.phase = ClonePhase::ViewPromoted;
    }

    failures
}
