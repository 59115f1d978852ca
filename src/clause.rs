//! Selection clause model and the active-column analyzer.
//!
//! The analyzer turns the most-recently-interacted clause into a set of
//! "active columns": discretized expressions that make the clause's value
//! space a finite dimension of the cube. Point clauses pass their columns
//! through untouched; interval clauses bin each brushed field into integer
//! pixel indices. Clauses the analyzer cannot express make the whole
//! selection unindexable, which is a value, not an error.

use std::fmt;

use crate::bin::{pixel_bin, PixelBin};
use crate::scale::ScaleDescriptor;
use crate::sql::{and, col, float, is_between, SqlExpr};

/// Opaque identity token attached to a selection clause. Equal sources mean
/// "same clause lineage".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        SourceId(id.into())
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        SourceId(id.to_string())
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One brushed interval: the filtered expression and its live range.
#[derive(Debug, Clone)]
pub struct IntervalBound {
    pub field: SqlExpr,
    pub range: Option<[f64; 2]>,
}

impl IntervalBound {
    pub fn new(field: SqlExpr, range: Option<[f64; 2]>) -> Self {
        IntervalBound { field, range }
    }
}

/// The live predicate carried by a clause.
#[derive(Debug, Clone)]
pub enum ClausePredicate {
    /// Point predicate, used verbatim; the referenced base columns ride
    /// alongside for column discovery.
    Literal { expr: SqlExpr, columns: Vec<String> },
    Interval(IntervalBound),
    Intervals(Vec<IntervalBound>),
}

impl ClausePredicate {
    /// Point predicate with its columns derived from the expression.
    pub fn point(expr: SqlExpr) -> Self {
        let columns = expr.columns();
        ClausePredicate::Literal { expr, columns }
    }

    /// Base columns this predicate touches.
    pub fn columns(&self) -> Vec<String> {
        match self {
            ClausePredicate::Literal { columns, .. } => columns.clone(),
            ClausePredicate::Interval(bound) => bound.field.columns(),
            ClausePredicate::Intervals(children) => {
                let mut out = Vec::new();
                for child in children {
                    for c in child.field.columns() {
                        if !out.contains(&c) {
                            out.push(c);
                        }
                    }
                }
                out
            }
        }
    }
}

/// Clause metadata, split by interaction kind.
#[derive(Debug, Clone)]
pub enum ClauseMeta {
    Point,
    Interval {
        scales: Vec<ScaleDescriptor>,
        bin: Option<String>,
        pixel_size: f64,
    },
}

impl ClauseMeta {
    pub fn interval(scales: Vec<ScaleDescriptor>) -> Self {
        ClauseMeta::Interval { scales, bin: None, pixel_size: 1.0 }
    }
}

/// A selection clause as delivered by an interactor.
#[derive(Debug, Clone)]
pub struct ActivationClause {
    pub source: Option<SourceId>,
    pub meta: Option<ClauseMeta>,
    pub predicate: Option<ClausePredicate>,
}

/// Discretized active dimensions derived from a clause, plus the recipe for
/// re-deriving a cube predicate from any later clause value.
#[derive(Debug, Clone)]
pub struct ActiveColumns {
    source: SourceId,
    columns: Vec<(String, SqlExpr)>,
    bins: Vec<PixelBin>,
    point: bool,
}

impl ActiveColumns {
    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Named active-column expressions, in clause-child order.
    pub fn columns(&self) -> &[(String, SqlExpr)] {
        &self.columns
    }

    /// Base columns referenced by the active-column expressions, deduplicated.
    pub fn base_columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (_, expr) in &self.columns {
            for c in expr.columns() {
                if !out.contains(&c) {
                    out.push(c);
                }
            }
        }
        out
    }

    /// Cube-side predicate for a clause value. An absent value (or one with
    /// no usable range) selects everything: the result is an empty conjunct
    /// list.
    pub fn predicate(&self, value: Option<&ClausePredicate>) -> Vec<SqlExpr> {
        let Some(value) = value else {
            return Vec::new();
        };
        if self.point {
            return match value {
                ClausePredicate::Literal { expr, .. } => vec![expr.clone()],
                _ => Vec::new(),
            };
        }
        match value {
            ClausePredicate::Interval(bound) if self.bins.len() == 1 => {
                self.bin_between(0, bound).into_iter().collect()
            }
            ClausePredicate::Intervals(children) => {
                let terms: Vec<SqlExpr> = children
                    .iter()
                    .enumerate()
                    .filter_map(|(i, bound)| self.bin_between(i, bound))
                    .collect();
                if terms.is_empty() {
                    Vec::new()
                } else {
                    vec![and(terms)]
                }
            }
            _ => Vec::new(),
        }
    }

    fn bin_between(&self, index: usize, bound: &IntervalBound) -> Option<SqlExpr> {
        let bin = self.bins.get(index)?;
        let [lo, hi] = bound.range?;
        Some(is_between(
            &format!("active{index}"),
            [float(bin.apply(lo)), float(bin.apply(hi))],
        ))
    }
}

/// Analyze a clause into its active columns. `None` marks the clause — and
/// with it the current selection epoch — as not indexable.
pub fn active_columns(clause: &ActivationClause) -> Option<ActiveColumns> {
    let source = clause.source.clone()?;
    let meta = clause.meta.as_ref()?;
    let predicate = clause.predicate.as_ref()?;
    match meta {
        ClauseMeta::Point => {
            let referenced = predicate.columns();
            if referenced.is_empty() {
                return None;
            }
            let columns = referenced.into_iter().map(|c| (c.clone(), col(c))).collect();
            Some(ActiveColumns { source, columns, bins: Vec::new(), point: true })
        }
        ClauseMeta::Interval { scales, bin, pixel_size } => {
            if scales.is_empty() {
                return None;
            }
            // One unsupported scale poisons the whole clause.
            let bins = scales
                .iter()
                .map(|s| pixel_bin(s, *pixel_size, bin.as_deref()))
                .collect::<Option<Vec<_>>>()?;
            let fields: Vec<&SqlExpr> = match predicate {
                ClausePredicate::Interval(bound) => vec![&bound.field],
                ClausePredicate::Intervals(children) => {
                    children.iter().map(|b| &b.field).collect()
                }
                ClausePredicate::Literal { .. } => return None,
            };
            if fields.len() != bins.len() {
                return None;
            }
            let columns = bins
                .iter()
                .zip(&fields)
                .enumerate()
                .map(|(i, (bin, field))| (format!("active{i}"), bin.expr(field)))
                .collect();
            Some(ActiveColumns { source, columns, bins, point: false })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::{ScaleDescriptor, ScaleType};
    use crate::sql::{eq, text};

    fn linear_scale() -> ScaleDescriptor {
        ScaleDescriptor::new(ScaleType::Linear, vec![0.0, 100.0], vec![0.0, 500.0])
    }

    fn interval_clause(scales: Vec<ScaleDescriptor>, predicate: ClausePredicate) -> ActivationClause {
        ActivationClause {
            source: Some("brush".into()),
            meta: Some(ClauseMeta::interval(scales)),
            predicate: Some(predicate),
        }
    }

    #[test]
    fn point_clause_passes_columns_through() {
        let clause = ActivationClause {
            source: Some("legend".into()),
            meta: Some(ClauseMeta::Point),
            predicate: Some(ClausePredicate::point(eq(col("category"), text("a")))),
        };
        let active = active_columns(&clause).unwrap();
        assert_eq!(active.columns().len(), 1);
        assert_eq!(active.columns()[0].0, "category");
        assert_eq!(active.columns()[0].1.to_string(), "\"category\"");

        // The live predicate is used verbatim.
        let value = ClausePredicate::point(eq(col("category"), text("b")));
        let preds = active.predicate(Some(&value));
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].to_string(), "\"category\" = 'b'");
        assert!(active.predicate(None).is_empty());
    }

    #[test]
    fn single_interval_bins_into_active0() {
        let clause = interval_clause(
            vec![linear_scale()],
            ClausePredicate::Interval(IntervalBound::new(col("x"), None)),
        );
        let active = active_columns(&clause).unwrap();
        assert_eq!(active.columns()[0].0, "active0");
        assert_eq!(
            active.columns()[0].1.to_string(),
            "FLOOR(5::DOUBLE * (\"x\"))::INTEGER"
        );
        assert_eq!(active.base_columns(), vec!["x"]);

        let value = ClausePredicate::Interval(IntervalBound::new(col("x"), Some([20.0, 40.0])));
        let preds = active.predicate(Some(&value));
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].to_string(), "(\"active0\" BETWEEN 100 AND 200)");
    }

    #[test]
    fn multi_interval_conjoins_per_child_ranges() {
        let clause = interval_clause(
            vec![linear_scale(), linear_scale()],
            ClausePredicate::Intervals(vec![
                IntervalBound::new(col("x"), None),
                IntervalBound::new(col("y"), None),
            ]),
        );
        let active = active_columns(&clause).unwrap();
        assert_eq!(active.columns().len(), 2);
        assert_eq!(active.columns()[1].0, "active1");
        assert_eq!(active.base_columns(), vec!["x", "y"]);

        let value = ClausePredicate::Intervals(vec![
            IntervalBound::new(col("x"), Some([0.0, 10.0])),
            IntervalBound::new(col("y"), Some([20.0, 40.0])),
        ]);
        let preds = active.predicate(Some(&value));
        assert_eq!(preds.len(), 1);
        assert_eq!(
            preds[0].to_string(),
            "((\"active0\" BETWEEN 0 AND 50) AND (\"active1\" BETWEEN 100 AND 200))"
        );
    }

    #[test]
    fn one_unsupported_scale_poisons_the_clause() {
        let band: ScaleDescriptor =
            serde_json::from_str(r#"{"type":"band","domain":[0,1],"range":[0,1]}"#).unwrap();
        let clause = interval_clause(
            vec![linear_scale(), band],
            ClausePredicate::Intervals(vec![
                IntervalBound::new(col("x"), None),
                IntervalBound::new(col("y"), None),
            ]),
        );
        assert!(active_columns(&clause).is_none());
    }

    #[test]
    fn missing_metadata_is_unindexable() {
        let clause = ActivationClause {
            source: Some("s".into()),
            meta: None,
            predicate: Some(ClausePredicate::point(eq(col("a"), text("b")))),
        };
        assert!(active_columns(&clause).is_none());

        let clause = ActivationClause {
            source: Some("s".into()),
            meta: Some(ClauseMeta::interval(Vec::new())),
            predicate: Some(ClausePredicate::Interval(IntervalBound::new(col("x"), None))),
        };
        assert!(active_columns(&clause).is_none());
    }
}
