//! SQL expression AST and printer.
//!
//! Expressions are plain data so that callers can inspect the base columns
//! they reference; SQL text is produced through `Display`.

use std::fmt;

/// Scalar literal embedded in a SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v}"),
            Literal::Str(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Literal::Bool(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
        }
    }
}

/// Binary operators used by synthesized expressions and predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        }
    }
}

/// SQL expression tree.
///
/// Column identifiers print double-quoted; everything else prints in the
/// shape it was constructed with, so a given tree always renders the same
/// text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Column(String),
    /// The `*` projection, only meaningful inside `COUNT(*)`-style calls.
    Star,
    Literal(Literal),
    Call { func: String, args: Vec<SqlExpr> },
    /// Postgres-style cast, printed as `expr::TYPE`.
    Cast { expr: Box<SqlExpr>, ty: String },
    Binary { op: BinaryOp, lhs: Box<SqlExpr>, rhs: Box<SqlExpr> },
    /// Explicit parenthesized group.
    Paren(Box<SqlExpr>),
    Between { expr: Box<SqlExpr>, lo: Box<SqlExpr>, hi: Box<SqlExpr> },
    And(Vec<SqlExpr>),
    Or(Vec<SqlExpr>),
}

impl SqlExpr {
    pub fn cast(self, ty: impl Into<String>) -> SqlExpr {
        SqlExpr::Cast { expr: Box::new(self), ty: ty.into() }
    }

    pub fn paren(self) -> SqlExpr {
        SqlExpr::Paren(Box::new(self))
    }

    pub fn binary(self, op: BinaryOp, rhs: SqlExpr) -> SqlExpr {
        SqlExpr::Binary { op, lhs: Box::new(self), rhs: Box::new(rhs) }
    }

    /// Attach an output alias, producing a select-list item.
    pub fn alias(self, name: impl Into<String>) -> SelectItem {
        SelectItem { expr: self, alias: Some(name.into()) }
    }

    /// Base column names referenced by this expression, in first-use order.
    pub fn columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<String>) {
        match self {
            SqlExpr::Column(name) => {
                if !out.iter().any(|c| c == name) {
                    out.push(name.clone());
                }
            }
            SqlExpr::Star | SqlExpr::Literal(_) => {}
            SqlExpr::Call { args, .. } => {
                for a in args {
                    a.collect_columns(out);
                }
            }
            SqlExpr::Cast { expr, .. } | SqlExpr::Paren(expr) => expr.collect_columns(out),
            SqlExpr::Binary { lhs, rhs, .. } => {
                lhs.collect_columns(out);
                rhs.collect_columns(out);
            }
            SqlExpr::Between { expr, lo, hi } => {
                expr.collect_columns(out);
                lo.collect_columns(out);
                hi.collect_columns(out);
            }
            SqlExpr::And(items) | SqlExpr::Or(items) => {
                for i in items {
                    i.collect_columns(out);
                }
            }
        }
    }
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlExpr::Column(name) => write!(f, "\"{name}\""),
            SqlExpr::Star => write!(f, "*"),
            SqlExpr::Literal(l) => write!(f, "{l}"),
            SqlExpr::Call { func, args } => {
                write!(f, "{func}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            SqlExpr::Cast { expr, ty } => write!(f, "{expr}::{ty}"),
            SqlExpr::Binary { op, lhs, rhs } => write!(f, "{lhs} {} {rhs}", op.as_str()),
            SqlExpr::Paren(expr) => write!(f, "({expr})"),
            SqlExpr::Between { expr, lo, hi } => {
                write!(f, "({expr} BETWEEN {lo} AND {hi})")
            }
            SqlExpr::And(items) => write_joined(f, items, " AND "),
            SqlExpr::Or(items) => write_joined(f, items, " OR "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[SqlExpr], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, ")")
}

/// One entry of a SELECT list: an expression with an optional output alias.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

impl SelectItem {
    /// The name this item is addressable by: its alias, or the column name
    /// for a bare column reference.
    pub fn output_name(&self) -> Option<&str> {
        match (&self.alias, &self.expr) {
            (Some(a), _) => Some(a),
            (None, SqlExpr::Column(name)) => Some(name),
            _ => None,
        }
    }
}

impl From<SqlExpr> for SelectItem {
    fn from(expr: SqlExpr) -> Self {
        SelectItem { expr, alias: None }
    }
}

impl From<&str> for SelectItem {
    fn from(name: &str) -> Self {
        SelectItem { expr: col(name), alias: None }
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            // A bare column aliased to its own name needs no AS clause.
            Some(a) if !matches!(&self.expr, SqlExpr::Column(c) if c == a) => {
                write!(f, "{} AS \"{a}\"", self.expr)
            }
            _ => write!(f, "{}", self.expr),
        }
    }
}

/// Reference to a base column.
pub fn col(name: impl Into<String>) -> SqlExpr {
    SqlExpr::Column(name.into())
}

pub fn int(v: i64) -> SqlExpr {
    SqlExpr::Literal(Literal::Int(v))
}

pub fn float(v: f64) -> SqlExpr {
    SqlExpr::Literal(Literal::Float(v))
}

pub fn text(v: impl Into<String>) -> SqlExpr {
    SqlExpr::Literal(Literal::Str(v.into()))
}

/// `name(args…)` function call.
pub fn call(func: impl Into<String>, args: Vec<SqlExpr>) -> SqlExpr {
    SqlExpr::Call { func: func.into(), args }
}

/// Range predicate over a named column: `("name" BETWEEN lo AND hi)`.
pub fn is_between(name: &str, range: [SqlExpr; 2]) -> SqlExpr {
    let [lo, hi] = range;
    SqlExpr::Between { expr: Box::new(col(name)), lo: Box::new(lo), hi: Box::new(hi) }
}

/// Conjunction. A single term passes through unwrapped.
pub fn and(mut terms: Vec<SqlExpr>) -> SqlExpr {
    if terms.len() == 1 {
        terms.pop().unwrap()
    } else {
        SqlExpr::And(terms)
    }
}

pub fn eq(lhs: SqlExpr, rhs: SqlExpr) -> SqlExpr {
    lhs.binary(BinaryOp::Eq, rhs)
}

pub fn sum(expr: SqlExpr) -> SqlExpr {
    call("SUM", vec![expr])
}

pub fn min(expr: SqlExpr) -> SqlExpr {
    call("MIN", vec![expr])
}

pub fn max(expr: SqlExpr) -> SqlExpr {
    call("MAX", vec![expr])
}

pub fn avg(expr: SqlExpr) -> SqlExpr {
    call("AVG", vec![expr])
}

pub fn count(expr: SqlExpr) -> SqlExpr {
    call("COUNT", vec![expr])
}

/// `COUNT(*)`.
pub fn count_star() -> SqlExpr {
    call("COUNT", vec![SqlExpr::Star])
}
