use std::panic::{RefUnwindSafe, UnwindSafe};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::FromSqlOwned;
use uuid::Uuid;
use crate::ElefantBranchError;
use crate::postgres_client_wrapper::{FromRow, PostgresClientWrapper};

/// A helper for running tests that require a database.
///
/// This will automatically create a new database for each test,
/// and drop it when the test is done, if the test succeeded.
///
/// All the methods on this struct unwraps errors directly to make it easier to write tests.
pub struct TestHelper {
    /// The name of the test database
    pub test_db_name: String,
    /// The main connected used against the database
    main_connection: PostgresClientWrapper,
    /// An identifier for the test helper
    helper_name: String,
    /// The port of the Postgres instance that was connected to.
    pub port: u16,
    /// If the database was cleaned up nicely
    cleaned_up_nicely: bool,
}

impl Drop for TestHelper {
    /// Drops the test helper, cleaning up the database if the test succeeded.
    fn drop(&mut self) {
        if self.cleaned_up_nicely {
            return;
        }

        if std::thread::panicking() {
            eprintln!("Thread is panicking when dropping test helper. Leaving database '{}' ({}) around to be inspected", self.test_db_name, self.helper_name);
        } else {
            let db_name = self.test_db_name.clone();
            let port = self.port;
            std::thread::spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                runtime.block_on(cleanup(&db_name, port));
            })
                .join()
                .expect("Failed to run test helper cleanup from drop");
        }
    }
}

impl RefUnwindSafe for TestHelper {}

impl UnwindSafe for TestHelper {}

/// Creates a new test helper, using a random database name.
/// This will connect to Postgres 15 on port 5415.
pub async fn get_test_helper(name: &str) -> TestHelper {
    get_test_helper_on_port(name, 5415).await
}

/// Creates a new test helper, using a random database name and a specific port.
pub async fn get_test_helper_on_port(name: &str, port: u16) -> TestHelper {
    let id = Uuid::new_v4().simple().to_string();

    let test_db_name = format!("test_db_{}", id);
    {
        let conn = get_test_connection_on_port("postgres", port).await;

        conn.execute_non_query(&format!("create database {}", test_db_name)).await.expect("Failed to create test database");
    }


    let conn = get_test_connection_on_port(&test_db_name, port).await;

    TestHelper {
        test_db_name,
        main_connection: conn,
        helper_name: name.to_string(),
        port,
        cleaned_up_nicely: false,
    }
}

impl TestHelper {
    /// Executes a query that does not return any results.
    pub async fn execute_not_query(&self, sql: &str) {
        self.get_conn().execute_non_query(sql).await.unwrap_or_else(|e| panic!("Failed to execute non query: {:?}\n{}", e, sql));
    }

    /// Executes a query that returns results.
    pub async fn get_results<T: FromRow>(&self, sql: &str) -> Vec<T> {
        self.get_conn().get_results(sql).await.unwrap_or_else(|e| panic!("Failed to get results for query: {:?}\n{}", e, sql))
    }

    /// Executes a query that returns a single column.
    pub async fn get_single_results<T: FromSqlOwned>(&self, sql: &str) -> Vec<T> {
        self.get_results::<(T, )>(sql).await.into_iter()
            .map(|t| t.0)
            .collect()
    }

    /// Executes a query that returns a single row result.
    pub async fn get_result<T: FromRow>(&self, sql: &str) -> T {
        let results = self.get_results(sql).await;
        assert_eq!(results.len(), 1, "Expected one result, got {}", results.len());
        results.into_iter().next().unwrap()
    }

    /// Executes a query that returns a single column of a single row result.
    pub async fn get_single_result<T: FromSqlOwned>(&self, sql: &str) -> T {
        let result = self.get_result::<(T, )>(sql).await;
        result.0
    }

    /// Gets the underlying connection to the database.
    pub fn get_conn(&self) -> &PostgresClientWrapper {
        &self.main_connection
    }

    /// Opens an extra connection to the test database, for tests that need two sessions.
    pub async fn create_connection(&self) -> PostgresClientWrapper {
        get_test_connection_on_port(&self.test_db_name, self.port).await
    }

    /// The connection string used to reach the test database.
    pub fn connection_string(&self) -> String {
        format!("host=localhost port={} user=postgres password=passw0rd dbname={}", self.port, self.test_db_name)
    }

    /// Stops the test helper, cleaning up the database.
    pub async fn stop(mut self) {
        cleanup(&self.test_db_name, self.port).await;
        self.cleaned_up_nicely = true;
    }
}

/// Gets a connection to the specified database on the specified port.
async fn get_test_connection_on_port(database_name: &str, port: u16) -> PostgresClientWrapper {
    let connection_string = format!("host=localhost port={port} user=postgres password=passw0rd dbname={database_name}");

    PostgresClientWrapper::new(&connection_string).await.expect("Connection to test database failed. Is postgres running?")
}

async fn cleanup(db_name: &str, port: u16) {
    let conn = get_test_connection_on_port("postgres", port).await;
    let version: i32 = conn.get_single_result::<String>("show server_version_num;").await.unwrap().parse().unwrap();
    if version >= 130000 {
        conn.execute_non_query(&format!("drop database {} with (force);", db_name)).await.expect("Failed to drop test database");
    } else {
        conn.execute_non_query(&format!("SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{}' AND pid != pg_backend_pid()", db_name)).await.expect("Failed to drop test database");
        conn.execute_non_query(&format!("drop database {};", db_name)).await.expect("Failed to drop test database");
    }
}

/// Asset that the specified Postgres error occurred.
pub fn assert_pg_error(result: crate::Result, code: SqlState) {
    match result {
        Err(ElefantBranchError::PostgresErrorWithQuery {
                source,
                ..
            }) => {
            assert_eq!(*source.as_db_error().unwrap().code(), code);
        }
        _ => {
            panic!("Expected PostgresErrorWithQuery, got {:?}", result);
        }
    }
}

/// Asserts that a statement was rejected by one of the generated branch triggers with a message containing `expected`.
pub fn assert_raised(result: crate::Result, expected: &str) {
    match &result {
        Err(e) if e.sql_state() == Some(&SqlState::RAISE_EXCEPTION) => {
            let message = e.database_message().unwrap_or_default();
            assert!(message.contains(expected), "Expected message containing '{}', got '{}'", expected, message);
        }
        _ => {
            panic!("Expected a raised exception containing '{}', got {:?}", expected, result);
        }
    }
}
