//! Top-level indexer: per-coordinator cache of active columns and per-client
//! cubes, orchestrating clause analysis, planning, and DDL submission.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::debug;

use crate::clause::{active_columns, ActivationClause, ActiveColumns, SourceId};
use crate::client::{ClientHandle, Selection};
use crate::config::IndexerOptions;
use crate::coordinator::Coordinator;
use crate::cube::{plan_cube, CacheEntry, CubeEntry, CubeInfo, MaterializeState};
use crate::sql::{create_schema, create_table_as, drop_schema_cascade};

/// Analysis of the current selection epoch: either usable active columns or
/// a memoized "this clause kind cannot be indexed".
#[derive(Debug, Clone)]
enum ActiveEntry {
    Columns(ActiveColumns),
    Unindexable,
}

impl ActiveEntry {
    fn source(&self) -> Option<&SourceId> {
        match self {
            ActiveEntry::Columns(active) => Some(active.source()),
            ActiveEntry::Unindexable => None,
        }
    }
}

/// Cache key: pointer identity of the client handle.
fn client_key(client: &ClientHandle) -> usize {
    Arc::as_ptr(client) as *const () as usize
}

/// Materializes pre-aggregated cube tables on demand so that updates along
/// the active selection clause re-aggregate over a small cube instead of
/// re-scanning base tables.
///
/// State is owned by one instance and mutated only through its methods;
/// `index` performs all cache reads and writes before the spawned DDL task
/// can run, and DDL completions never reach back into this state.
#[derive(Debug)]
pub struct CubeIndexer {
    coordinator: Arc<dyn Coordinator>,
    schema: String,
    enabled: bool,
    active: Option<ActiveEntry>,
    indexes: HashMap<usize, CacheEntry>,
}

impl CubeIndexer {
    pub fn new(coordinator: Arc<dyn Coordinator>, options: IndexerOptions) -> Self {
        CubeIndexer {
            coordinator,
            schema: options.schema,
            enabled: options.enabled,
            active: None,
            indexes: HashMap::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Disabling drops all cached state; persisted cube tables are left
    /// intact.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled && self.enabled {
            self.clear();
        }
        self.enabled = enabled;
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Changing the schema drops all cached state; it does not drop tables
    /// in the previous schema.
    pub fn set_schema(&mut self, schema: impl Into<String>) {
        let schema = schema.into();
        if schema != self.schema {
            self.clear();
            self.schema = schema;
        }
    }

    /// Active columns of the current selection epoch, if indexable ones have
    /// been established.
    pub fn active(&self) -> Option<&ActiveColumns> {
        match self.active.as_ref()? {
            ActiveEntry::Columns(active) => Some(active),
            ActiveEntry::Unindexable => None,
        }
    }

    /// Number of clients with a cached entry in the current epoch.
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Drop all cached entries and forget the active clause. In-flight DDL
    /// is not cancelled; its completions simply become unreferenced.
    pub fn clear(&mut self) {
        self.indexes.clear();
        self.active = None;
    }

    /// Clear the cache, then drop the cube schema and everything in it.
    /// Intended for use after base-table updates invalidate the cubes.
    ///
    /// Local state is cleared before submission, so a failure here still
    /// leaves the indexer ready to re-materialize.
    pub async fn drop_index_tables(&mut self) -> Result<()> {
        self.clear();
        self.coordinator
            .exec(vec![drop_schema_cascade(&self.schema)])
            .await
    }

    /// Index one client update. Returns the cached or freshly built cube
    /// entry, `Some(CubeEntry::Skip)` when the client is indexable but
    /// untouched by the current cross-filter, or `None` when the clause or
    /// client cannot be indexed. Never fails for data-dependent conditions.
    pub fn index(
        &mut self,
        client: &ClientHandle,
        selection: &dyn Selection,
        clause: &ActivationClause,
    ) -> Option<CubeEntry> {
        if !self.enabled {
            return None;
        }
        let source = clause.source.as_ref()?;

        // A new clause lineage invalidates the whole epoch.
        if let Some(active) = &self.active {
            if active.source() != Some(source) {
                self.clear();
            }
        }
        if matches!(self.active, Some(ActiveEntry::Unindexable)) {
            return None;
        }
        if self.active.is_none() {
            match active_columns(clause) {
                Some(active) => self.active = Some(ActiveEntry::Columns(active)),
                None => {
                    self.active = Some(ActiveEntry::Unindexable);
                    return None;
                }
            }
        }

        let key = client_key(client);
        if let Some(entry) = self.indexes.get(&key) {
            debug!(client = key, "cube cache hit");
            return match entry {
                CacheEntry::Built(info) => Some(CubeEntry::Built(info.clone())),
                CacheEntry::Skip => Some(CubeEntry::Skip),
                CacheEntry::Unindexable => None,
            };
        }

        let Some(index_cols) = client.index_columns() else {
            self.indexes.insert(key, CacheEntry::Unindexable);
            return None;
        };
        if selection.skip(client.as_ref(), clause) {
            self.indexes.insert(key, CacheEntry::Skip);
            return Some(CubeEntry::Skip);
        }

        let active = match &self.active {
            Some(ActiveEntry::Columns(active)) => active.clone(),
            _ => return None,
        };
        // The cube's WHERE carries only the non-active predicates; the
        // active dimension is grouped, not filtered.
        let filter = selection.remove(source).predicate(client.as_ref());
        let plan = plan_cube(client.query(filter), &active, &index_cols, &self.schema);
        debug!(table = %plan.table, "materializing cube");

        let state = self.submit(&plan.table, &plan.create);
        let info = Arc::new(CubeInfo::new(plan, active, state));
        self.indexes.insert(key, CacheEntry::Built(info.clone()));
        Some(CubeEntry::Built(info))
    }

    /// Submit the schema + table DDL as one batch on a spawned task and
    /// return the readiness handle. Failures go to the coordinator's error
    /// sink; the cache entry is not evicted.
    fn submit(&self, table: &str, create: &str) -> watch::Receiver<MaterializeState> {
        let (tx, rx) = watch::channel(MaterializeState::Pending);
        let statements = vec![create_schema(&self.schema), create_table_as(table, create)];
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            match coordinator.exec(statements).await {
                Ok(()) => {
                    let _ = tx.send(MaterializeState::Ready);
                }
                Err(error) => {
                    coordinator.log_error(&error);
                    let _ = tx.send(MaterializeState::Failed(error.to_string()));
                }
            }
        });
        rx
    }
}
