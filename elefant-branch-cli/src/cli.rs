use std::num::NonZeroUsize;
use std::thread;
use clap::{Args, Parser, Subcommand, ValueEnum};
use elefant_branch::{BranchOptions, PrimaryKeyPolicy};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about)]
#[command(propagate_version = true)]
/// Branches a live Postgres database, runs requests against the branches and shows how the rows differ.
///
/// The tables of the schema are replaced by views while a branch is active. Run this against a test
/// database, never against one that serves real traffic.
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub db_args: DbArgs,

    /// How many tables to set up in parallel when branching. Defaults to the number of estimated cores
    /// on the machine. If the available parallelism cannot be determined, it defaults to 1.
    #[arg(long, default_value_t = get_default_max_parallelism())]
    pub max_parallelism: NonZeroUsize,

    /// How the key of each table is found.
    #[arg(long, value_enum, default_value_t = KeyPolicy::IndexName)]
    pub primary_key_policy: KeyPolicy,
}

fn get_default_max_parallelism() -> NonZeroUsize {
    thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

impl Cli {
    pub(crate) fn get_branch_options(&self) -> BranchOptions {
        BranchOptions {
            schema: self.db_args.schema.clone(),
            max_parallel: Some(self.max_parallelism),
            primary_key_policy: self.primary_key_policy.into(),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, Eq, PartialEq)]
pub enum KeyPolicy {
    /// Use the first unique index with `pkey` in its name.
    IndexName,
    /// Use the primary key constraint.
    Catalog,
}

impl From<KeyPolicy> for PrimaryKeyPolicy {
    fn from(value: KeyPolicy) -> Self {
        match value {
            KeyPolicy::IndexName => PrimaryKeyPolicy::IndexNameHeuristic,
            KeyPolicy::Catalog => PrimaryKeyPolicy::CatalogPrimaryKey,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Puts back tables left behind by a branch that was never committed, and drops its schema
    Cleanup,
    /// Runs two scripts on their own branch and prints the differences as JSON
    Compare(CompareArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DbArgs {
    /// The host of the database to branch
    #[arg(long, env = "ELEFANT_BRANCH_DB_HOST")]
    pub db_host: String,

    /// The port of the database to branch
    #[arg(long, env = "ELEFANT_BRANCH_DB_PORT", default_value_t = 5432)]
    pub db_port: u16,

    /// The username to use when connecting to the database
    #[arg(long, env = "ELEFANT_BRANCH_DB_USER")]
    pub db_user: String,

    /// The password to use when connecting to the database
    #[arg(long, env = "ELEFANT_BRANCH_DB_PASSWORD")]
    pub db_password: String,

    /// The name of the database to branch
    #[arg(long, env = "ELEFANT_BRANCH_DB_NAME")]
    pub db_name: String,

    /// The schema whose tables are branched
    #[arg(long, env = "ELEFANT_BRANCH_SCHEMA", default_value = "public")]
    pub schema: String,
}

impl DbArgs {
    pub(crate) fn get_connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.db_host, self.db_port, self.db_user, self.db_password, self.db_name
        )
    }

    #[cfg(test)]
    pub(crate) fn from_test_helper(helper: &elefant_branch::test_helpers::TestHelper) -> Self {
        Self {
            db_host: "localhost".to_string(),
            db_port: helper.port,
            db_user: "postgres".to_string(),
            db_password: "passw0rd".to_string(),
            db_name: helper.test_db_name.clone(),
            schema: "public".to_string(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// A file with the requests of the control run. Each non-empty line is one request.
    #[arg(long)]
    pub control: String,

    /// A file with the requests of the experimental run. Each non-empty line is one request.
    #[arg(long)]
    pub experimental: String,

    /// A column to leave out of the comparison, written as `table.column`. Can be given multiple times.
    #[arg(long = "skip-column", value_parser = parse_skip_column)]
    pub skip_columns: Vec<SkipColumn>,

    /// Print a diff for every request instead of only for the final state.
    #[arg(long)]
    pub per_request: bool,

    /// Keep the branch schemas around after comparing, so they can be inspected.
    #[arg(long)]
    pub keep_branches: bool,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SkipColumn {
    pub table: String,
    pub column: String,
}

fn parse_skip_column(value: &str) -> Result<SkipColumn, String> {
    match value.split_once('.') {
        Some((table, column)) if !table.is_empty() && !column.is_empty() => Ok(SkipColumn {
            table: table.to_string(),
            column: column.to_string(),
        }),
        _ => Err(format!("expected `table.column`, got `{value}`")),
    }
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert()
}

#[test]
fn skip_columns_need_a_table() {
    assert_eq!(
        parse_skip_column("users.seen_at"),
        Ok(SkipColumn {
            table: "users".to_string(),
            column: "seen_at".to_string(),
        })
    );
    assert!(parse_skip_column("seen_at").is_err());
    assert!(parse_skip_column(".seen_at").is_err());
}

#[test]
fn parses_compare_arguments() {
    let cli = Cli::try_parse_from([
        "elefant-branch",
        "--db-host", "localhost",
        "--db-user", "postgres",
        "--db-password", "passw0rd",
        "--db-name", "shop",
        "--primary-key-policy", "catalog",
        "compare",
        "--control", "control.sql",
        "--experimental", "experimental.sql",
        "--skip-column", "users.seen_at",
        "--skip-column", "orders.created_at",
        "--per-request",
    ])
    .unwrap();

    assert_eq!(cli.db_args.db_port, 5432);
    assert_eq!(cli.get_branch_options().primary_key_policy, PrimaryKeyPolicy::CatalogPrimaryKey);
    match cli.command {
        Commands::Compare(args) => {
            assert_eq!(args.skip_columns.len(), 2);
            assert!(args.per_request);
            assert!(!args.keep_branches);
        }
        Commands::Cleanup => panic!("Expected compare"),
    }
}
