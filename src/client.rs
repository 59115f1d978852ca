//! Capabilities consumed from visual clients and selections, and derivation
//! of a client's index columns from its query shape.

use std::sync::Arc;

use crate::clause::{ActivationClause, SourceId};
use crate::sql::{col, count_star, sum, BinaryOp, SelectItem, SelectQuery, SqlExpr};

/// Auxiliary per-group row count carried through the cube for weighted
/// re-aggregation.
pub const COUNT_COLUMN: &str = "__count__";

/// Client-declared cube shape: GROUP BY dimensions, re-aggregation items for
/// the cube select, and auxiliary columns the cube DDL must also compute.
#[derive(Debug, Clone)]
pub struct IndexColumns {
    pub dims: Vec<String>,
    pub aggr: Vec<SelectItem>,
    pub aux: Vec<(String, SqlExpr)>,
}

/// A visual client owning one parametric aggregation query.
pub trait VisualClient: Send + Sync {
    /// The client's aggregation query with `filter` substituted into its
    /// WHERE clause.
    fn query(&self, filter: Vec<SqlExpr>) -> SelectQuery;

    /// The client's cube shape, or `None` when the client is not indexable.
    /// Most implementations delegate to [`derive_index_columns`].
    fn index_columns(&self) -> Option<IndexColumns>;
}

pub type ClientHandle = Arc<dyn VisualClient>;

/// A set of selection clauses, consumed through the operations the indexer
/// needs: dropping the active clause, materializing a client's filter, and
/// the cross-filter skip hint.
pub trait Selection: Send + Sync {
    /// This selection without the clause identified by `source`.
    fn remove(&self, source: &SourceId) -> Box<dyn Selection>;

    /// Materialized filter for a client.
    fn predicate(&self, client: &dyn VisualClient) -> Vec<SqlExpr>;

    /// True iff the client is unaffected by the current cross-filter update.
    fn skip(&self, client: &dyn VisualClient, clause: &ActivationClause) -> bool;
}

enum AggKind {
    Sum,
    Min,
    Max,
    Avg,
    Unsupported,
}

/// Aggregates whose per-group results cannot be merged by re-aggregation
/// over the cube.
const NON_DECOMPOSABLE: &[&str] = &[
    "MEDIAN", "MODE", "QUANTILE", "STDDEV", "STDDEV_POP", "STDDEV_SAMP", "VARIANCE", "VAR_POP",
    "VAR_SAMP", "CORR", "COVAR_POP", "COVAR_SAMP", "ARG_MAX", "ARG_MIN", "FIRST", "LAST", "LIST",
    "STRING_AGG", "ARRAY_AGG",
];

fn classify(expr: &SqlExpr) -> Option<AggKind> {
    let SqlExpr::Call { func, .. } = expr else {
        return None;
    };
    let name = func.to_ascii_uppercase();
    match name.as_str() {
        // COUNT and SUM both merge by summing partial results.
        "COUNT" | "SUM" => Some(AggKind::Sum),
        "MIN" => Some(AggKind::Min),
        "MAX" => Some(AggKind::Max),
        "AVG" => Some(AggKind::Avg),
        _ if NON_DECOMPOSABLE.contains(&name.as_str()) => Some(AggKind::Unsupported),
        // Any other call is treated as a scalar expression; it only
        // qualifies if it names a GROUP BY dimension.
        _ => None,
    }
}

/// Inspect an aggregation query and derive its cube shape.
///
/// Indexable iff every select item is either a GROUP BY dimension or a
/// decomposable aggregate. COUNT and SUM re-aggregate as SUM; MIN/MAX as
/// themselves; AVG as a count-weighted sum ratio, which adds a `COUNT(*)`
/// auxiliary column. Anything else yields `None`.
pub fn derive_index_columns(query: &SelectQuery) -> Option<IndexColumns> {
    let group_names: Vec<&str> = query
        .group_by()
        .iter()
        .filter_map(|g| match g {
            SqlExpr::Column(name) => Some(name.as_str()),
            _ => None,
        })
        .collect();

    let mut dims = Vec::new();
    let mut aggr = Vec::new();
    let mut needs_count = false;

    for item in query.select() {
        let name = item.output_name()?.to_string();
        match classify(&item.expr) {
            Some(AggKind::Sum) => aggr.push(sum(col(&name)).alias(&name)),
            Some(AggKind::Min) => aggr.push(crate::sql::min(col(&name)).alias(&name)),
            Some(AggKind::Max) => aggr.push(crate::sql::max(col(&name)).alias(&name)),
            Some(AggKind::Avg) => {
                needs_count = true;
                let weighted = sum(col(&name).binary(BinaryOp::Mul, col(COUNT_COLUMN)));
                let total = sum(col(COUNT_COLUMN));
                aggr.push(weighted.binary(BinaryOp::Div, total).alias(&name));
            }
            Some(AggKind::Unsupported) => return None,
            None => {
                if group_names.contains(&name.as_str()) {
                    dims.push(name);
                } else {
                    return None;
                }
            }
        }
    }

    let aux = if needs_count {
        vec![(COUNT_COLUMN.to_string(), count_star())]
    } else {
        Vec::new()
    };
    Some(IndexColumns { dims, aggr, aux })
}
