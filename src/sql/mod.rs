//! Minimal SQL building algebra: expressions, select queries, DDL helpers.

pub mod expr;
pub mod query;

pub use expr::{
    and, avg, call, col, count, count_star, eq, float, int, is_between, max, min, sum, text,
    BinaryOp, Literal, SelectItem, SqlExpr,
};
pub use query::{
    create_schema, create_table_as, drop_schema_cascade, SelectQuery, TableRef, TableSource,
};
