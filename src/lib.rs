//! On-demand materialization of pre-aggregated "data cube" tables for
//! interactive exploratory dashboards.
//!
//! Given a visual client's aggregation query, the active selection, and the
//! active clause's metadata, the indexer decides whether the pair is
//! indexable, derives a canonical cube schema, issues the DDL that
//! materializes it, and hands back a parameterized select that re-derives
//! the client's result for any value of the active clause.

pub mod bin;
pub mod clause;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod cube;
pub mod id;
pub mod indexer;
pub mod mock;
pub mod scale;
pub mod sql;

pub use clause::{
    active_columns, ActivationClause, ActiveColumns, ClauseMeta, ClausePredicate, IntervalBound,
    SourceId,
};
pub use client::{derive_index_columns, ClientHandle, IndexColumns, Selection, VisualClient};
pub use config::IndexerOptions;
pub use coordinator::Coordinator;
pub use cube::{plan_cube, CacheEntry, CubeEntry, CubeInfo, CubePlan, MaterializeState};
pub use indexer::CubeIndexer;
pub use scale::{scale_transform, ScaleDescriptor, ScaleTransform, ScaleType};
