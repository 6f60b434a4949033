use itertools::Itertools;
use crate::helpers::StringExt;
use crate::quoting::{AttemptedKeywordUsage, IdentifierQuoter};
use crate::trigger_builder::{RowVariable, TriggerProcedure, TriggerStatement};

const REQUEST_ID_VARIABLE: &str = "_request_id";

impl RowVariable {
    fn as_sql(&self) -> &'static str {
        match self {
            RowVariable::New => "new",
            RowVariable::Old => "old",
        }
    }
}

impl TriggerProcedure {
    /// The `create function` statement for the procedure.
    pub fn function_sql(&self, quoter: &IdentifierQuoter) -> String {
        let mut body = String::new();
        for statement in &self.statements {
            statement.render(quoter, &mut body);
        }

        format!(
            "create or replace function {}() returns trigger\n    language plpgsql as\n$$\ndeclare\n    {} bigint;\nbegin\n{}end;\n$$;",
            self.function.quote(quoter),
            REQUEST_ID_VARIABLE,
            body
        )
    }

    /// Replaces any earlier trigger with the same name on the view.
    pub fn trigger_sql(&self, quoter: &IdentifierQuoter) -> String {
        let trigger = quoter.quote(&self.trigger_name, AttemptedKeywordUsage::Other);
        let view = self.view.quote(quoter);

        format!(
            "drop trigger if exists {trigger} on {view};\ncreate trigger {trigger}\n    instead of {} on {view}\n    for each row execute function {}();",
            self.event.as_sql(),
            self.function.quote(quoter),
        )
    }
}

impl TriggerStatement {
    fn render(&self, quoter: &IdentifierQuoter, sql: &mut String) {
        let column = |c: &str| quoter.quote(c, AttemptedKeywordUsage::ColumnName);
        let field = |row: RowVariable, c: &str| format!("{}.{}", row.as_sql(), column(c));

        match self {
            TriggerStatement::ReadCounter { counter, value_column } => {
                sql.push_str(&format!(
                    "    select {} into {} from {};\n",
                    column(value_column),
                    REQUEST_ID_VARIABLE,
                    counter.quote(quoter)
                ));
            }
            TriggerStatement::AssignIdentity { view, column: name, increment, minimum } => {
                let target = field(RowVariable::New, name);
                sql.push_str(&format!(
                    "    if {target} is null then\n        {target} := (select coalesce(max({}), {minimum}) + {increment} from {});\n    end if;\n",
                    column(name),
                    view.quote(quoter),
                ));
            }
            TriggerStatement::UniqueCheck { view, columns, only_when_changed } => {
                sql.push_str("    if ");
                if *only_when_changed {
                    push_changed_condition(sql, columns, &field);
                    sql.push_str(" and ");
                }
                sql.push_str(&format!("exists (select 1 from {} where ", view.quote(quoter)));
                sql.push_join(
                    " and ",
                    columns.iter().map(|c| format!("{} = {}", column(c), field(RowVariable::New, c))),
                );
                sql.push_str(") then\n");
                sql.push_str(&format!(
                    "        raise exception '{}', {};\n    end if;\n",
                    format!(
                        "Key ({})=({}) already exists",
                        columns.iter().map(|c| message_literal(c)).join(", "),
                        columns.iter().map(|_| "%").join(", ")
                    ),
                    columns.iter().map(|c| field(RowVariable::New, c)).join(", ")
                ));
            }
            TriggerStatement::ForeignKeyCheck { constraint_name, table_name, referenced, columns, referenced_columns } => {
                sql.push_str("    if ");
                sql.push_join(
                    " and ",
                    columns.iter().map(|c| format!("{} is not null", field(RowVariable::New, c))),
                );
                sql.push_str(&format!(" and not exists (select 1 from {} where ", referenced.quote(quoter)));
                sql.push_join(
                    " and ",
                    columns
                        .iter()
                        .zip(referenced_columns)
                        .map(|(c, r)| format!("{} = {}", column(r), field(RowVariable::New, c))),
                );
                sql.push_str(") then\n");
                sql.push_str(&format!(
                    "        raise exception '{}';\n    end if;\n",
                    message_literal(&format!(
                        "insert or update on table \"{table_name}\" violates foreign key constraint \"{constraint_name}\""
                    ))
                ));
            }
            TriggerStatement::RestrictCheck { constraint_name, table_name, referencing, referencing_columns, columns, only_when_changed } => {
                sql.push_str("    if ");
                if *only_when_changed {
                    push_changed_condition(sql, columns, &field);
                    sql.push_str(" and ");
                }
                sql.push_str(&format!("exists (select 1 from {} where ", referencing.quote(quoter)));
                sql.push_join(
                    " and ",
                    referencing_columns
                        .iter()
                        .zip(columns)
                        .map(|(r, c)| format!("{} = {}", column(r), field(RowVariable::Old, c))),
                );
                sql.push_str(") then\n");
                sql.push_str(&format!(
                    "        raise exception '{}';\n    end if;\n",
                    message_literal(&format!(
                        "update or delete on table \"{table_name}\" violates foreign key constraint \"{constraint_name}\" on table \"{}\"",
                        referencing.name
                    ))
                ));
            }
            TriggerStatement::InsertDelta { delta, row, columns, request_id_column } => {
                sql.push_str(&format!("    insert into {} (", delta.quote(quoter)));
                sql.push_join(", ", columns.iter().map(|c| column(c)).chain([column(request_id_column)]));
                sql.push_str(") values (");
                sql.push_join(
                    ", ",
                    columns
                        .iter()
                        .map(|c| field(*row, c))
                        .chain([REQUEST_ID_VARIABLE.to_string()]),
                );
                sql.push_str(");\n");
            }
            TriggerStatement::Return(row) => {
                sql.push_str(&format!("    return {};\n", row.as_sql()));
            }
        }
    }
}

fn push_changed_condition(sql: &mut String, columns: &[String], field: &impl Fn(RowVariable, &str) -> String) {
    sql.push('(');
    sql.push_join(", ", columns.iter().map(|c| field(RowVariable::New, c)));
    sql.push_str(") is distinct from (");
    sql.push_join(", ", columns.iter().map(|c| field(RowVariable::Old, c)));
    sql.push(')');
}

/// Text that goes inside a `raise` format string as is.
fn message_literal(message: &str) -> String {
    message.replace('\'', "''").replace('%', "%%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch_ddl::describe_clone;
    use crate::models::*;
    use crate::trigger_builder::build_procedures;
    use crate::default;
    use indoc::indoc;

    fn accounts() -> Table {
        let mut table = Table::new("public", "accounts");
        table.columns.insert(
            "id".to_string(),
            Column {
                name: "id".to_string(),
                data_type: "integer".to_string(),
                generator: Some(ValueGenerator::Identity(IdentityColumn {
                    generation: IdentityGeneration::Always,
                    start: 1,
                    increment: 1,
                    minimum: 1,
                    maximum: 2147483647,
                })),
                ..default()
            },
        );
        table.columns.insert("owner".to_string(), Column { name: "owner".to_string(), data_type: "text".to_string(), ..default() });
        table.columns.insert("bank".to_string(), Column { name: "bank".to_string(), data_type: "text".to_string(), ..default() });
        table.indices = vec![Index {
            name: "accounts_pkey".to_string(),
            is_unique: true,
            is_primary_key: true,
            column_names: vec!["id".to_string()],
            ..default()
        }];
        table.foreign_keys = vec![ForeignKeyConstraint {
            name: "accounts_bank_fkey".to_string(),
            table_name: "accounts".to_string(),
            column_names: vec!["bank".to_string()],
            referenced_schema_name: "public".to_string(),
            referenced_table_name: "banks".to_string(),
            referenced_column_names: vec!["code".to_string()],
            update_action: ReferenceAction::NoAction,
            delete_action: ReferenceAction::NoAction,
        }];
        table.references = vec![
            Reference {
                constraint_name: "transfers_account_fkey".to_string(),
                referencing_table_name: "transfers".to_string(),
                referencing_column_names: vec!["account".to_string()],
                column_names: vec!["id".to_string()],
                update_action: ReferenceAction::Restrict,
                delete_action: ReferenceAction::Cascade,
            },
        ];
        table.key = TableKey::Keyed { columns: vec!["id".to_string()] };
        table
    }

    fn render_all() -> Vec<(String, String)> {
        let quoter = IdentifierQuoter::empty();
        let cloned = describe_clone(&accounts(), "branch_a", &quoter);
        build_procedures(&cloned)
            .into_iter()
            .map(|p| (p.function_sql(&quoter), p.trigger_sql(&quoter)))
            .collect()
    }

    #[test]
    fn insert_procedure() {
        let rendered = render_all();

        assert_eq!(
            rendered[0].0,
            indoc! {r#"
            create or replace function branch_a.accounts_redirect_insert() returns trigger
                language plpgsql as
            $$
            declare
                _request_id bigint;
            begin
                select id into _request_id from branch_a.rid;
                if new.id is null then
                    new.id := (select coalesce(max(id), 1) + 1 from public.accounts);
                end if;
                if exists (select 1 from public.accounts where id = new.id) then
                    raise exception 'Key (id)=(%) already exists', new.id;
                end if;
                if new.bank is not null and not exists (select 1 from public.banks where code = new.bank) then
                    raise exception 'insert or update on table "accounts" violates foreign key constraint "accounts_bank_fkey"';
                end if;
                insert into branch_a.accountsplus (bank, id, owner, rid) values (new.bank, new.id, new.owner, _request_id);
                return new;
            end;
            $$;"#}
        );

        assert_eq!(
            rendered[0].1,
            indoc! {r#"
            drop trigger if exists accounts_redirect_insert_trigger on public.accounts;
            create trigger accounts_redirect_insert_trigger
                instead of insert on public.accounts
                for each row execute function branch_a.accounts_redirect_insert();"#}
        );
    }

    #[test]
    fn update_procedure() {
        let rendered = render_all();

        assert_eq!(
            rendered[1].0,
            indoc! {r#"
            create or replace function branch_a.accounts_redirect_update() returns trigger
                language plpgsql as
            $$
            declare
                _request_id bigint;
            begin
                select id into _request_id from branch_a.rid;
                if (new.id) is distinct from (old.id) and exists (select 1 from public.accounts where id = new.id) then
                    raise exception 'Key (id)=(%) already exists', new.id;
                end if;
                if new.bank is not null and not exists (select 1 from public.banks where code = new.bank) then
                    raise exception 'insert or update on table "accounts" violates foreign key constraint "accounts_bank_fkey"';
                end if;
                if (new.id) is distinct from (old.id) and exists (select 1 from public.transfers where account = old.id) then
                    raise exception 'update or delete on table "accounts" violates foreign key constraint "transfers_account_fkey" on table "transfers"';
                end if;
                insert into branch_a.accountsminus (bank, id, owner, rid) values (old.bank, old.id, old.owner, _request_id);
                insert into branch_a.accountsplus (bank, id, owner, rid) values (new.bank, new.id, new.owner, _request_id);
                return new;
            end;
            $$;"#}
        );
    }

    #[test]
    fn delete_procedure_skips_cascading_references() {
        let rendered = render_all();

        assert_eq!(
            rendered[2].0,
            indoc! {r#"
            create or replace function branch_a.accounts_redirect_delete() returns trigger
                language plpgsql as
            $$
            declare
                _request_id bigint;
            begin
                select id into _request_id from branch_a.rid;
                insert into branch_a.accountsminus (bank, id, owner, rid) values (old.bank, old.id, old.owner, _request_id);
                return old;
            end;
            $$;"#}
        );
    }

    #[test]
    fn rendering_ignores_catalog_order() {
        let quoter = IdentifierQuoter::empty();
        let mut table = accounts();
        table.indices.push(Index {
            name: "accounts_owner_key".to_string(),
            is_unique: true,
            column_names: vec!["owner".to_string()],
            ..default()
        });
        let mut reversed = table.clone();
        reversed.indices.reverse();

        let render = |t: &Table| {
            build_procedures(&describe_clone(t, "branch_a", &quoter))
                .into_iter()
                .map(|p| p.function_sql(&quoter))
                .collect::<Vec<_>>()
        };

        assert_eq!(render(&table), render(&reversed));
    }

    #[test]
    fn messages_escape_quotes() {
        assert_eq!(message_literal("it's"), "it''s");
    }

    #[test]
    fn messages_escape_format_placeholders() {
        assert_eq!(message_literal("100% off"), "100%% off");

        let mut table = Table::new("public", "rates%");
        table.columns.insert("pct%".to_string(), Column { name: "pct%".to_string(), data_type: "integer".to_string(), ..default() });
        table.indices = vec![Index {
            name: "rates%_pkey".to_string(),
            is_unique: true,
            is_primary_key: true,
            column_names: vec!["pct%".to_string()],
            ..default()
        }];
        table.key = TableKey::Keyed { columns: vec!["pct%".to_string()] };

        let quoter = IdentifierQuoter::empty();
        let cloned = describe_clone(&table, "branch_a", &quoter);
        let insert = build_procedures(&cloned)[0].function_sql(&quoter);

        assert!(
            insert.contains(r#"raise exception 'Key (pct%%)=(%) already exists', new."pct%";"#),
            "{}",
            insert
        );
    }
}
