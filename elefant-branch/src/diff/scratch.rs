use tracing::{debug, warn};
use uuid::Uuid;
use crate::postgres_client_wrapper::PostgresClientWrapper;
use crate::quoting::{AttemptedKeywordUsage, IdentifierQuoter};
use crate::{CleanupFailure, ElefantBranchError, Result};

/// Something that has to be torn down with a round trip to the database once it is no longer needed.
pub(crate) trait AsyncCleanup {
    async fn cleanup(self, connection: &PostgresClientWrapper) -> Result;
}

/// Temporary views created while diffing one table.
///
/// The views are named with a prefix unique to this diff, so diffs never see each other's views.
pub(crate) struct ScratchViews<'q> {
    quoter: &'q IdentifierQuoter,
    prefix: String,
    created: Vec<String>,
}

impl<'q> ScratchViews<'q> {
    pub fn new(quoter: &'q IdentifierQuoter) -> Self {
        let id = Uuid::new_v4().simple().to_string();

        ScratchViews {
            quoter,
            prefix: format!("diff_{}", &id[..12]),
            created: Vec::new(),
        }
    }

    /// Creates a temporary view, and returns its quoted name.
    pub async fn create(&mut self, connection: &PostgresClientWrapper, suffix: &str, query: &str) -> Result<String> {
        let name = self.quoter.quote(format!("{}_{}", self.prefix, suffix), AttemptedKeywordUsage::Other);
        connection
            .execute_non_query(&format!("create temporary view {name} as {query};"))
            .await?;
        self.created.push(name.clone());

        Ok(name)
    }
}

impl AsyncCleanup for ScratchViews<'_> {
    /// Drops the views, newest first since later views select from earlier ones.
    async fn cleanup(self, connection: &PostgresClientWrapper) -> Result {
        debug!(prefix = %self.prefix, count = self.created.len(), "Dropping scratch views");

        let mut failures = Vec::new();
        for name in self.created.into_iter().rev() {
            if let Err(error) = connection.execute_non_query(&format!("drop view if exists {name};")).await {
                warn!(view = %name, "Failed to drop scratch view");
                failures.push(CleanupFailure {
                    object: format!("view {name}"),
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ElefantBranchError::CleanupFailed(failures))
        }
    }
}
