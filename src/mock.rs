//! Mock coordinator, selection, and client implementations for testing.
//!
//! Configurable to fail so tests can exercise error handling without a real
//! database.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::clause::{ActivationClause, SourceId};
use crate::client::{derive_index_columns, IndexColumns, Selection, VisualClient};
use crate::coordinator::Coordinator;
use crate::sql::{col, SelectItem, SelectQuery, SqlExpr};

/// Coordinator that records every submitted batch instead of executing it.
#[derive(Debug, Default)]
pub struct MockCoordinator {
    batches: Mutex<Vec<Vec<String>>>,
    fail_exec: AtomicBool,
    errors: Mutex<Vec<String>>,
}

impl MockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches submitted so far, in submission order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    /// Configure whether exec calls should fail.
    pub fn set_fail_exec(&self, fail: bool) {
        self.fail_exec.store(fail, Ordering::SeqCst);
    }

    /// Errors routed through [`Coordinator::log_error`].
    pub fn logged_errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

#[async_trait]
impl Coordinator for MockCoordinator {
    async fn exec(&self, statements: Vec<String>) -> Result<()> {
        self.batches.lock().unwrap().push(statements);
        if self.fail_exec.load(Ordering::SeqCst) {
            return Err(anyhow!("mock exec failure"));
        }
        Ok(())
    }

    fn log_error(&self, error: &anyhow::Error) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

/// Selection whose post-`remove` filter and skip hint are fixed up front.
#[derive(Debug, Clone, Default)]
pub struct MockSelection {
    /// Predicates that remain once the active clause is removed.
    pub residual: Vec<SqlExpr>,
    /// Whether every client should be reported as unaffected.
    pub skip_all: bool,
}

impl MockSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_residual(residual: Vec<SqlExpr>) -> Self {
        MockSelection { residual, skip_all: false }
    }

    pub fn skipping() -> Self {
        MockSelection { residual: Vec::new(), skip_all: true }
    }
}

impl Selection for MockSelection {
    fn remove(&self, _source: &SourceId) -> Box<dyn Selection> {
        Box::new(self.clone())
    }

    fn predicate(&self, _client: &dyn VisualClient) -> Vec<SqlExpr> {
        self.residual.clone()
    }

    fn skip(&self, _client: &dyn VisualClient, _clause: &ActivationClause) -> bool {
        self.skip_all
    }
}

/// Client with a fixed `GROUP BY dims + aggregates FROM table` query.
#[derive(Debug, Clone)]
pub struct TestClient {
    table: String,
    dims: Vec<String>,
    aggregates: Vec<SelectItem>,
    order_by: Vec<SqlExpr>,
}

impl TestClient {
    pub fn new(table: impl Into<String>) -> Self {
        TestClient {
            table: table.into(),
            dims: Vec::new(),
            aggregates: Vec::new(),
            order_by: Vec::new(),
        }
    }

    pub fn dim(mut self, name: impl Into<String>) -> Self {
        self.dims.push(name.into());
        self
    }

    pub fn aggregate(mut self, item: SelectItem) -> Self {
        self.aggregates.push(item);
        self
    }

    pub fn order_by(mut self, key: SqlExpr) -> Self {
        self.order_by.push(key);
        self
    }
}

impl VisualClient for TestClient {
    fn query(&self, filter: Vec<SqlExpr>) -> SelectQuery {
        let mut q = SelectQuery::new();
        q.add_select(self.dims.iter().map(|d| SelectItem::from(col(d.clone()))))
            .add_select(self.aggregates.iter().cloned())
            .from_table(&self.table)
            .add_filter(filter)
            .add_group_by(self.dims.iter().map(|d| col(d.clone())))
            .add_order_by(self.order_by.iter().cloned());
        q
    }

    fn index_columns(&self) -> Option<IndexColumns> {
        derive_index_columns(&self.query(Vec::new()))
    }
}
