use std::fmt::Display;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, Row, SimpleQueryMessage};
use tokio_postgres::types::{FromSqlOwned};
use tokio_postgres::row::RowIndex;
use tracing::debug;
use crate::{ElefantBranchError, Result};

/// A single connection to Postgres, shared by everything that reads or changes a branch.
pub struct PostgresClientWrapper {
    client: Client,
    join_handle: JoinHandle<Result<()>>,
    version: i32,
}

impl PostgresClientWrapper {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let (client, connection) =
            tokio_postgres::connect(connection_string, NoTls).await?;

        // The connection object performs the actual communication with the database,
        // so spawn it off to run on its own.
        let join_handle = tokio::spawn(async move {
            match connection.await {
                Err(e) => Err(ElefantBranchError::PostgresError(e)),
                Ok(_) => Ok(())
            }
        });

        let version = match client.simple_query("SHOW server_version_num;").await?.first() {
            Some(SimpleQueryMessage::Row(row)) => {
                let version: i32 = row.get(0)
                    .and_then(|v| v.parse().ok())
                    .ok_or(ElefantBranchError::InvalidPostgresVersionResponse)?;
                if version < 120000 {
                    return Err(ElefantBranchError::UnsupportedPostgresVersion(version));
                }
                version / 1000
            }
            _ => return Err(ElefantBranchError::InvalidPostgresVersionResponse)
        };

        Ok(PostgresClientWrapper {
            client,
            join_handle,
            version
        })
    }

    pub async fn execute_non_query(&self, sql: &str) -> Result {
        debug!(sql, "executing");
        self.client.batch_execute(sql).await.map_err(|e| ElefantBranchError::PostgresErrorWithQuery {
            source: e,
            query: sql.to_string(),
        })?;

        Ok(())
    }

    pub async fn get_results<T: FromRow>(&self, sql: &str) -> Result<Vec<T>> {

        let query_results = self.client.query(sql, &[]).await.map_err(|e| ElefantBranchError::PostgresErrorWithQuery {
            source: e,
            query: sql.to_string(),
        })?;

        let mut output = Vec::with_capacity(query_results.len());

        for row in query_results.into_iter() {
            output.push(T::from_row(row)?);
        }

        Ok(output)
    }

    pub async fn get_result<T: FromRow>(&self, sql: &str) -> Result<T> {
        let mut results = self.get_results(sql).await?;
        if results.len() != 1 {
            return Err(ElefantBranchError::InvalidNumberOfResults{
                actual: results.len(),
                expected: 1,
            });
        }

        match results.pop() {
            Some(r) => Ok(r),
            None => Err(ElefantBranchError::InvalidNumberOfResults { actual: 0, expected: 1 }),
        }
    }

    pub async  fn get_single_results<T: FromSqlOwned>(&self, sql: &str) -> Result<Vec<T>> {
        let r = self.get_results::<(T,)>(sql).await?.into_iter()
            .map(|t| t.0)
            .collect();

        Ok(r)
    }

    pub async fn get_single_result<T: FromSqlOwned>(&self, sql: &str) -> Result<T> {
        let result = self.get_result::<(T,)>(sql).await?;
        Ok(result.0)
    }

    /// Runs a query through the simple query protocol and returns every value in its text form.
    ///
    /// This works for any column type, which makes it the way rows of user tables are read,
    /// since their types are not known at compile time.
    pub async fn get_text_rows(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        let messages = self.client.simple_query(sql).await.map_err(|e| ElefantBranchError::PostgresErrorWithQuery {
            source: e,
            query: sql.to_string(),
        })?;

        let rows = messages.into_iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => Some(
                    (0..row.len())
                        .map(|idx| row.get(idx).map(str::to_string))
                        .collect(),
                ),
                _ => None,
            })
            .collect();

        Ok(rows)
    }

    pub fn version(&self) -> i32 {
        self.version
    }
}

impl Drop for PostgresClientWrapper {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

pub trait FromRow: Sized {
    fn from_row(row: Row) -> Result<Self>;
}

impl<T1: FromSqlOwned> FromRow for (T1,) {
    fn from_row(row: Row) -> Result<Self> {
        Ok((
            row.try_get(0)?,
        ))
    }
}

impl<T1: FromSqlOwned, T2: FromSqlOwned> FromRow for (T1, T2) {
    fn from_row(row: Row) -> Result<Self> {
        Ok((
            row.try_get(0)?,
            row.try_get(1)?,
        ))
    }
}

impl<T1: FromSqlOwned, T2: FromSqlOwned, T3: FromSqlOwned> FromRow for (T1, T2, T3) {
    fn from_row(row: Row) -> Result<Self> {
        Ok((
            row.try_get(0)?,
            row.try_get(1)?,
            row.try_get(2)?,
        ))
    }
}


pub(crate) trait FromPgChar: Sized {
    fn from_pg_char(c: char) -> std::result::Result<Self, ElefantBranchError>;
}

pub(crate) trait RowEnumExt {
    fn try_get_enum_value<T: FromPgChar, I: RowIndex + Display>(&self, idx: I) -> Result<T>;
}

impl RowEnumExt for Row {
    fn try_get_enum_value<T: FromPgChar, I: RowIndex + Display>(&self, idx: I) -> Result<T> {
        let value: i8 = self.try_get(idx)?;
        let c = value as u8 as char;
        T::from_pg_char(c)
    }
}
