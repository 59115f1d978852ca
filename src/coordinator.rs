//! Coordinator capability: the narrow surface through which SQL reaches the
//! backing analytical database.

use std::fmt::Debug;

use anyhow::Result;
use async_trait::async_trait;
use tracing::error;

/// Executes SQL on behalf of the indexer.
///
/// `exec` submits a batch as one unit; statement order within a batch is
/// preserved, which the indexer relies on for schema-before-table DDL.
#[async_trait]
pub trait Coordinator: Debug + Send + Sync {
    async fn exec(&self, statements: Vec<String>) -> Result<()>;

    /// Structured error sink for asynchronous failures. The default routes
    /// to the tracing subscriber.
    fn log_error(&self, error: &anyhow::Error) {
        error!(error = %error, "cube DDL execution failed");
    }
}
