//! Cube planning: derive the materialization DDL, the content-addressed
//! table name, and the parameterized select template for one client.

use std::sync::Arc;

use tokio::sync::watch;

use crate::clause::{ActiveColumns, ClausePredicate};
use crate::client::IndexColumns;
use crate::id::{cube_id, cube_table};
use crate::sql::{col, SelectItem, SelectQuery};

/// Progress of a cube's CREATE TABLE submission.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterializeState {
    Pending,
    Ready,
    Failed(String),
}

impl MaterializeState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MaterializeState::Pending)
    }
}

/// Output of the planner, before DDL submission.
#[derive(Debug, Clone)]
pub struct CubePlan {
    pub create: String,
    pub id: String,
    pub table: String,
    pub select: SelectQuery,
}

/// Compose the cube plan for `(client query, active columns, index columns)`.
///
/// The client's aggregation query is augmented with the active bins and
/// auxiliary columns as extra grouping dimensions, the active base columns
/// are pushed into every feeding subquery, and ordering is deferred to the
/// cube-select layer. The DDL text's content hash is the cube identity, so
/// identical queries share a table.
pub fn plan_cube(
    mut query: SelectQuery,
    active: &ActiveColumns,
    index: &IndexColumns,
    schema: &str,
) -> CubePlan {
    query.add_select(
        active
            .columns()
            .iter()
            .map(|(name, expr)| expr.clone().alias(name.clone())),
    );
    query.add_select(
        index
            .aux
            .iter()
            .map(|(name, expr)| expr.clone().alias(name.clone())),
    );
    query.add_group_by(active.columns().iter().map(|(name, _)| col(name.clone())));
    query.push_down_select(&active.base_columns());
    let order = query.take_order_by();

    let create = query.to_string();
    let id = cube_id(&create);
    let table = cube_table(schema, &id);

    let mut select = SelectQuery::new();
    select
        .add_select(index.dims.iter().map(|d| SelectItem::from(col(d.clone()))))
        .add_select(index.aggr.iter().cloned())
        .from_table(&table)
        .add_group_by(index.dims.iter().map(|d| col(d.clone())))
        .add_order_by(order);

    CubePlan { create, id, table, select }
}

/// Handle to one materialized (or materializing) cube.
///
/// The select template never carries a WHERE clause; every refresh goes
/// through [`CubeInfo::query`], which clones the template and applies the
/// active predicate for the given clause value.
#[derive(Debug)]
pub struct CubeInfo {
    id: String,
    table: String,
    create: String,
    active: ActiveColumns,
    select: SelectQuery,
    state: watch::Receiver<MaterializeState>,
}

impl CubeInfo {
    pub(crate) fn new(
        plan: CubePlan,
        active: ActiveColumns,
        state: watch::Receiver<MaterializeState>,
    ) -> Self {
        CubeInfo {
            id: plan.id,
            table: plan.table,
            create: plan.create,
            active,
            select: plan.select,
            state,
        }
    }

    /// Content hash of the creation DDL, lowercase hex.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Fully qualified cube table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creation DDL text (the SELECT the table is materialized from).
    pub fn create(&self) -> &str {
        &self.create
    }

    pub fn active(&self) -> &ActiveColumns {
        &self.active
    }

    /// The un-filtered select template over the cube table.
    pub fn select(&self) -> &SelectQuery {
        &self.select
    }

    /// Select query answering the client's result for one clause value.
    pub fn query(&self, value: Option<&ClausePredicate>) -> SelectQuery {
        let mut q = self.select.clone();
        q.add_filter(self.active.predicate(value));
        q
    }

    /// Current submission state, without waiting.
    pub fn state(&self) -> MaterializeState {
        self.state.borrow().clone()
    }

    /// Wait for the DDL submission to reach a terminal state.
    pub async fn result(&self) -> MaterializeState {
        let mut rx = self.state.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if current.is_terminal() {
                return current;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }
}

/// What the indexer remembers for one client within the current active-source
/// epoch.
#[derive(Debug, Clone)]
pub enum CacheEntry {
    /// Indexable; DDL issued.
    Built(Arc<CubeInfo>),
    /// Indexable, but untouched by the current cross-filter.
    Skip,
    /// Memoized "this client cannot be indexed".
    Unindexable,
}

/// Public result of indexing an indexable client.
#[derive(Debug, Clone)]
pub enum CubeEntry {
    Built(Arc<CubeInfo>),
    Skip,
}

impl CubeEntry {
    /// The cube handle, when one was built.
    pub fn cube(&self) -> Option<&Arc<CubeInfo>> {
        match self {
            CubeEntry::Built(info) => Some(info),
            CubeEntry::Skip => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, CubeEntry::Skip)
    }
}
