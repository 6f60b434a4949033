use crate::cli::{Commands, CompareArgs, SkipColumn};
use clap::Parser;
use elefant_branch::{Brancher, PostgresClientWrapper, Result};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

mod cli;

const CONTROL_BRANCH: &str = "control";
const EXPERIMENTAL_BRANCH: &str = "experimental";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();

    if let Some(output) = run(cli).await? {
        println!("{output}");
    }

    Ok(())
}

/// Runs the command, returning what should be printed to stdout.
#[instrument(skip_all)]
async fn run(cli: cli::Cli) -> Result<Option<String>> {
    let connection = PostgresClientWrapper::new(&cli.db_args.get_connection_string()).await?;
    let mut brancher = Brancher::new(&connection, cli.get_branch_options()).await?;

    match cli.command {
        Commands::Cleanup => {
            info!("Stale branches have been cleaned up");
            Ok(None)
        }
        Commands::Compare(args) => {
            let result = do_compare(&connection, &mut brancher, &args).await;

            if !args.keep_branches {
                for namespace in [CONTROL_BRANCH, EXPERIMENTAL_BRANCH] {
                    if brancher.get_branch(namespace).is_none() {
                        continue;
                    }
                    match (brancher.delete(namespace).await, &result) {
                        (Ok(_), _) => {}
                        (Err(e), Ok(_)) => return Err(e),
                        (Err(e), Err(_)) => warn!(namespace, error = %e, "Failed to delete branch"),
                    }
                }
            }

            result.map(Some)
        }
    }
}

#[instrument(skip_all)]
async fn do_compare(
    connection: &PostgresClientWrapper,
    brancher: &mut Brancher<'_>,
    args: &CompareArgs,
) -> Result<String> {
    let control = read_requests(&args.control).await?;
    let experimental = read_requests(&args.experimental).await?;

    run_requests(connection, brancher, CONTROL_BRANCH, &control).await?;
    run_requests(connection, brancher, EXPERIMENTAL_BRANCH, &experimental).await?;

    let skip_columns = group_skip_columns(&args.skip_columns);
    let request_count = control.len().max(experimental.len()) as i64;

    let output = if args.per_request {
        let diffs = brancher
            .compute_diff_per_request(CONTROL_BRANCH, EXPERIMENTAL_BRANCH, request_count, &skip_columns)
            .await?;
        serde_json::to_string_pretty(&diffs)
    } else {
        let last_request = (request_count - 1).max(0);
        let diffs = brancher
            .compute_diff_at_n(CONTROL_BRANCH, EXPERIMENTAL_BRANCH, last_request, &skip_columns)
            .await?;
        serde_json::to_string_pretty(&diffs)
    };

    let json = output.map_err(std::io::Error::from)?;
    Ok(json)
}

/// Every non-empty line of the file is one request.
async fn read_requests(path: &str) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[instrument(skip(connection, brancher, requests), fields(request_count = requests.len()))]
async fn run_requests(
    connection: &PostgresClientWrapper,
    brancher: &mut Brancher<'_>,
    namespace: &str,
    requests: &[String],
) -> Result {
    brancher.branch(namespace).await?;

    for (idx, request) in requests.iter().enumerate() {
        if idx > 0 {
            brancher.increment_request_id(namespace).await?;
        }
        connection.execute_non_query(request).await?;
    }

    brancher.commit(namespace).await
}

fn group_skip_columns(skip_columns: &[SkipColumn]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for skip in skip_columns {
        grouped.entry(skip.table.clone()).or_default().push(skip.column.clone());
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, DbArgs, KeyPolicy};
    use elefant_branch::test_helpers;
    use elefant_branch::test_helpers::TestHelper;
    use elefant_test_macros::pg_test;
    use std::num::NonZeroUsize;

    async fn write_script(helper: &TestHelper, name: &str, content: &str) -> String {
        let path = std::env::temp_dir().join(format!("{}_{}.sql", helper.test_db_name, name));
        tokio::fs::write(&path, content).await.unwrap();
        path.to_string_lossy().to_string()
    }

    fn compare(helper: &TestHelper, args: CompareArgs) -> Cli {
        Cli {
            command: Commands::Compare(args),
            db_args: DbArgs::from_test_helper(helper),
            max_parallelism: NonZeroUsize::new(1).unwrap(),
            primary_key_policy: KeyPolicy::IndexName,
        }
    }

    #[test]
    fn skip_columns_are_grouped_by_table() {
        let grouped = group_skip_columns(&[
            SkipColumn { table: "users".to_string(), column: "seen_at".to_string() },
            SkipColumn { table: "orders".to_string(), column: "created_at".to_string() },
            SkipColumn { table: "users".to_string(), column: "updated_at".to_string() },
        ]);

        assert_eq!(
            grouped,
            BTreeMap::from([
                ("orders".to_string(), vec!["created_at".to_string()]),
                ("users".to_string(), vec!["seen_at".to_string(), "updated_at".to_string()]),
            ])
        );
    }

    #[pg_test(arg(postgres = 16))]
    async fn compares_two_scripts(helper: &TestHelper) {
        helper
            .execute_not_query(
                r#"
        create table users(accountid int primary key, username text);
        insert into users values (1, 'A'), (2, 'B');
        "#,
            )
            .await;

        let control = write_script(helper, "control", "update users set username = 'AA' where accountid = 1;\n\ninsert into users values (3, 'C');\n").await;
        let experimental = write_script(helper, "experimental", "update users set username = 'AA' where accountid = 1;\ninsert into users values (3, 'CC');\n").await;

        let output = run(compare(
            helper,
            CompareArgs {
                control,
                experimental,
                skip_columns: vec![],
                per_request: false,
                keep_branches: false,
            },
        ))
        .await
        .unwrap()
        .unwrap();

        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["users"]["column_names"], serde_json::json!(["accountid", "username"]));
        assert_eq!(json["users"]["control"], serde_json::json!([["1", "AA"], ["3", "C"]]));
        assert_eq!(json["users"]["baseline"], serde_json::json!([["1", "A"], [null, null]]));
        assert_eq!(json["users"]["experimental"], serde_json::json!([["1", "AA"], ["3", "CC"]]));

        let users = helper.get_results::<(i32, String)>("select accountid, username from users order by accountid").await;
        assert_eq!(users, vec![(1, "A".to_string()), (2, "B".to_string())]);

        let schemas: i64 = helper
            .get_single_result("select count(*) from pg_namespace where nspname in ('control', 'experimental')")
            .await;
        assert_eq!(schemas, 0);
    }

    #[pg_test(arg(postgres = 16))]
    async fn compares_each_request(helper: &TestHelper) {
        helper
            .execute_not_query(
                r#"
        create table users(accountid int primary key, username text, seen_at int);
        insert into users values (1, 'A', 0);
        "#,
            )
            .await;

        let control = write_script(helper, "control", "update users set seen_at = 1;\ninsert into users values (2, 'B', 1);\n").await;
        let experimental = write_script(helper, "experimental", "update users set seen_at = 2;\ninsert into users values (2, 'B', 2);\n").await;

        let output = run(compare(
            helper,
            CompareArgs {
                control,
                experimental,
                skip_columns: vec![SkipColumn { table: "users".to_string(), column: "seen_at".to_string() }],
                per_request: true,
                keep_branches: true,
            },
        ))
        .await
        .unwrap()
        .unwrap();

        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["users"]["control"], serde_json::json!([]));
        assert_eq!(json[1]["users"]["control"], serde_json::json!([["2", "B"]]));
        assert_eq!(json[1]["users"]["experimental"], serde_json::json!([["2", "B"]]));

        let schemas: i64 = helper
            .get_single_result("select count(*) from pg_namespace where nspname in ('control', 'experimental')")
            .await;
        assert_eq!(schemas, 2);
    }

    #[pg_test(arg(postgres = 16))]
    async fn cleanup_restores_tables(helper: &TestHelper) {
        helper
            .execute_not_query(
                r#"
        create table users(accountid int primary key, username text);
        insert into users values (1, 'A');
        "#,
            )
            .await;

        {
            let connection = helper.create_connection().await;
            let mut brancher = Brancher::new(&connection, Default::default()).await.unwrap();
            brancher.branch("abandoned").await.unwrap();
        }

        let cli = Cli {
            command: Commands::Cleanup,
            db_args: DbArgs::from_test_helper(helper),
            max_parallelism: NonZeroUsize::new(1).unwrap(),
            primary_key_policy: KeyPolicy::IndexName,
        };
        assert_eq!(run(cli).await.unwrap(), None);

        let kind: String = helper
            .get_single_result("select relkind::text from pg_class where oid = 'public.users'::regclass")
            .await;
        assert_eq!(kind, "r");
    }
}
