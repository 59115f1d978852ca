use std::sync::Arc;

use datacube::id::cube_id;
use datacube::mock::{MockCoordinator, MockSelection, TestClient};
use datacube::sql::{call, col, eq, sum, text, SelectQuery, SqlExpr};
use datacube::{
    derive_index_columns, ActivationClause, ClauseMeta, ClausePredicate, ClientHandle,
    CubeIndexer, IndexColumns, IndexerOptions, IntervalBound, ScaleDescriptor, ScaleType,
    VisualClient,
};

fn indexer(coordinator: &Arc<MockCoordinator>) -> CubeIndexer {
    CubeIndexer::new(coordinator.clone(), IndexerOptions::default())
}

fn sales_client() -> ClientHandle {
    Arc::new(
        TestClient::new("sales")
            .dim("year")
            .aggregate(sum(col("sales")).alias("s")),
    )
}

fn point_clause(source: &str, column: &str) -> ActivationClause {
    ActivationClause {
        source: Some(source.into()),
        meta: Some(ClauseMeta::Point),
        predicate: Some(ClausePredicate::point(eq(col(column), text("a")))),
    }
}

fn linear_scale() -> ScaleDescriptor {
    ScaleDescriptor::new(ScaleType::Linear, vec![0.0, 100.0], vec![0.0, 500.0])
}

fn interval_clause(source: &str) -> ActivationClause {
    ActivationClause {
        source: Some(source.into()),
        meta: Some(ClauseMeta::interval(vec![linear_scale()])),
        predicate: Some(ClausePredicate::Interval(IntervalBound::new(col("x"), None))),
    }
}

// S1: point selection over one column becomes a raw active column and the
// cube groups by (dims, active column).
#[tokio::test]
async fn point_selection_single_active_column() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client = sales_client();
    let selection = MockSelection::new();
    let clause = point_clause("S", "category");

    let entry = idx.index(&client, &selection, &clause).unwrap();
    let cube = entry.cube().unwrap();

    let expected_create = "SELECT \"year\", SUM(\"sales\") AS \"s\", \"category\" \
                           FROM sales GROUP BY \"year\", \"category\"";
    assert_eq!(cube.create(), expected_create);
    assert_eq!(cube.id(), cube_id(expected_create));
    assert_eq!(cube.table(), format!("mosaic.cube_{}", cube.id()));

    let active = idx.active().unwrap();
    assert_eq!(active.columns().len(), 1);
    assert_eq!(active.columns()[0].1.to_string(), "\"category\"");

    // The live point predicate is applied verbatim.
    let value = ClausePredicate::point(eq(col("category"), text("b")));
    assert_eq!(
        cube.query(Some(&value)).to_string(),
        format!(
            "SELECT \"year\", SUM(\"s\") AS \"s\" FROM {} \
             WHERE \"category\" = 'b' GROUP BY \"year\"",
            cube.table()
        )
    );
}

// S2: linear interval, pixel size 1, floor binning.
#[tokio::test]
async fn linear_interval_bins_to_pixel_indices() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client = sales_client();
    let selection = MockSelection::new();

    let entry = idx.index(&client, &selection, &interval_clause("brush")).unwrap();
    let cube = entry.cube().unwrap();

    assert!(cube
        .create()
        .contains("FLOOR(5::DOUBLE * (\"x\"))::INTEGER AS \"active0\""));
    assert!(cube.create().contains("GROUP BY \"year\", \"active0\""));

    let value = ClausePredicate::Interval(IntervalBound::new(col("x"), Some([20.0, 40.0])));
    let q = cube.query(Some(&value)).to_string();
    assert!(q.contains("WHERE (\"active0\" BETWEEN 100 AND 200)"));

    // No value selects everything.
    assert!(!cube.query(None).to_string().contains("WHERE"));
}

// S3: log scale, pixel size 2, unsupported rounding label falls back to FLOOR.
#[tokio::test]
async fn log_interval_with_unknown_rounding_falls_back_to_floor() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client = sales_client();
    let selection = MockSelection::new();

    let mut scale = ScaleDescriptor::new(ScaleType::Log, vec![1.0, 1000.0], vec![0.0, 300.0]);
    scale.base = Some(10.0);
    let clause = ActivationClause {
        source: Some("brush".into()),
        meta: Some(ClauseMeta::Interval {
            scales: vec![scale],
            bin: Some("trunc".to_string()),
            pixel_size: 2.0,
        }),
        predicate: Some(ClausePredicate::Interval(IntervalBound::new(col("x"), None))),
    };

    let entry = idx.index(&client, &selection, &clause).unwrap();
    let cube = entry.cube().unwrap();
    let active0 = &idx.active().unwrap().columns()[0].1;
    let rendered = active0.to_string();
    assert!(rendered.starts_with("FLOOR("), "got {rendered}");
    assert!(rendered.contains("LN(\"x\") / LN(10)"));
    // 300 px over 3 decades, halved by the pixel size.
    assert!(rendered.contains("50::DOUBLE * "));
    assert!(cube.create().contains("AS \"active0\""));
}

// S4: a two-dimensional brush conjoins one BETWEEN per child interval.
#[tokio::test]
async fn two_dimensional_brush_conjoins_bins() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client = sales_client();
    let selection = MockSelection::new();

    let clause = ActivationClause {
        source: Some("brush2d".into()),
        meta: Some(ClauseMeta::interval(vec![linear_scale(), linear_scale()])),
        predicate: Some(ClausePredicate::Intervals(vec![
            IntervalBound::new(col("x"), None),
            IntervalBound::new(col("y"), None),
        ])),
    };
    let entry = idx.index(&client, &selection, &clause).unwrap();
    let cube = entry.cube().unwrap();
    assert!(cube.create().contains("AS \"active0\""));
    assert!(cube.create().contains("AS \"active1\""));

    let value = ClausePredicate::Intervals(vec![
        IntervalBound::new(col("x"), Some([0.0, 10.0])),
        IntervalBound::new(col("y"), Some([20.0, 40.0])),
    ]);
    let q = cube.query(Some(&value)).to_string();
    assert!(q.contains(
        "WHERE ((\"active0\" BETWEEN 0 AND 50) AND (\"active1\" BETWEEN 100 AND 200))"
    ));
}

// S5: a clause source change drops the epoch cache and re-issues DDL.
#[tokio::test]
async fn source_change_invalidates_the_epoch() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client = sales_client();
    let selection = MockSelection::new();

    let first = idx
        .index(&client, &selection, &point_clause("S1", "category"))
        .unwrap();
    first.cube().unwrap().result().await;
    assert_eq!(idx.len(), 1);

    let second = idx
        .index(&client, &selection, &point_clause("S2", "region"))
        .unwrap();
    second.cube().unwrap().result().await;

    assert_eq!(idx.len(), 1);
    assert_ne!(
        first.cube().unwrap().create(),
        second.cube().unwrap().create()
    );
    // One exec batch per distinct cube DDL across both sources.
    assert_eq!(coordinator.batches().len(), 2);

    // Re-indexing under the second source is a cache hit.
    let again = idx
        .index(&client, &selection, &point_clause("S2", "region"))
        .unwrap();
    assert!(Arc::ptr_eq(second.cube().unwrap(), again.cube().unwrap()));
    assert_eq!(coordinator.batches().len(), 2);
}

// S6: dropping index tables issues exactly one DROP SCHEMA and resets state;
// the next index call re-creates the schema before the table.
#[tokio::test]
async fn drop_index_tables_resets_and_recreates() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client = sales_client();
    let selection = MockSelection::new();

    let entry = idx
        .index(&client, &selection, &point_clause("S", "category"))
        .unwrap();
    entry.cube().unwrap().result().await;

    idx.drop_index_tables().await.unwrap();
    assert!(idx.is_empty());
    assert!(idx.active().is_none());
    let batches = coordinator.batches();
    assert_eq!(
        batches.last().unwrap(),
        &vec!["DROP SCHEMA IF EXISTS \"mosaic\" CASCADE".to_string()]
    );

    let entry = idx
        .index(&client, &selection, &point_clause("S", "category"))
        .unwrap();
    entry.cube().unwrap().result().await;
    let batches = coordinator.batches();
    let last = batches.last().unwrap();
    assert_eq!(last.len(), 2);
    assert_eq!(last[0], "CREATE SCHEMA IF NOT EXISTS mosaic");
    assert!(last[1].starts_with("CREATE TABLE IF NOT EXISTS mosaic.cube_"));
}

#[tokio::test]
async fn disabled_indexer_indexes_nothing() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = CubeIndexer::new(
        coordinator.clone(),
        IndexerOptions { enabled: false, ..IndexerOptions::default() },
    );
    let client = sales_client();
    let selection = MockSelection::new();

    assert!(idx
        .index(&client, &selection, &point_clause("S", "category"))
        .is_none());
    assert!(idx.is_empty());
    assert!(idx.active().is_none());
    assert!(coordinator.batches().is_empty());
}

#[tokio::test]
async fn disabling_clears_cached_state() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client = sales_client();
    let selection = MockSelection::new();

    idx.index(&client, &selection, &point_clause("S", "category"))
        .unwrap();
    assert_eq!(idx.len(), 1);
    idx.set_enabled(false);
    assert!(idx.is_empty());
    assert!(idx.active().is_none());
}

#[tokio::test]
async fn clause_without_source_is_not_indexable() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client = sales_client();
    let selection = MockSelection::new();

    let clause = ActivationClause {
        source: None,
        meta: Some(ClauseMeta::Point),
        predicate: Some(ClausePredicate::point(eq(col("category"), text("a")))),
    };
    assert!(idx.index(&client, &selection, &clause).is_none());
    assert!(idx.is_empty());
}

#[tokio::test]
async fn repeated_identical_calls_return_the_same_cube_without_new_ddl() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client = sales_client();
    let selection = MockSelection::new();
    let clause = point_clause("S", "category");

    let first = idx.index(&client, &selection, &clause).unwrap();
    first.cube().unwrap().result().await;
    let second = idx.index(&client, &selection, &clause).unwrap();

    assert!(Arc::ptr_eq(first.cube().unwrap(), second.cube().unwrap()));
    assert_eq!(coordinator.batches().len(), 1);
}

#[tokio::test]
async fn identical_queries_share_a_table_name() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let selection = MockSelection::new();
    let clause = point_clause("S", "category");
    let a = sales_client();
    let b = sales_client();

    let cube_a = idx.index(&a, &selection, &clause).unwrap();
    let cube_b = idx.index(&b, &selection, &clause).unwrap();
    let cube_a = cube_a.cube().unwrap();
    let cube_b = cube_b.cube().unwrap();

    assert_eq!(idx.len(), 2);
    assert_eq!(cube_a.create(), cube_b.create());
    assert_eq!(cube_a.id(), cube_b.id());
    assert_eq!(cube_a.table(), cube_b.table());
}

#[tokio::test]
async fn unindexable_client_is_memoized_as_none() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let selection = MockSelection::new();
    let clause = point_clause("S", "category");
    let client: ClientHandle = Arc::new(
        TestClient::new("sales")
            .dim("year")
            .aggregate(call("MEDIAN", vec![col("price")]).alias("m")),
    );

    assert!(idx.index(&client, &selection, &clause).is_none());
    assert!(idx.index(&client, &selection, &clause).is_none());
    // Memoized: the client has a cache entry, but no DDL was issued.
    assert_eq!(idx.len(), 1);
    assert!(coordinator.batches().is_empty());
}

#[tokio::test]
async fn skip_hint_stores_a_skip_entry_without_ddl() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client = sales_client();
    let selection = MockSelection::skipping();

    let entry = idx
        .index(&client, &selection, &point_clause("S", "category"))
        .unwrap();
    assert!(entry.is_skip());
    assert_eq!(idx.len(), 1);
    assert!(coordinator.batches().is_empty());
}

#[tokio::test]
async fn residual_selection_filters_the_cube_ddl() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client = sales_client();
    let selection = MockSelection::with_residual(vec![eq(col("region"), text("west"))]);

    let entry = idx
        .index(&client, &selection, &point_clause("S", "category"))
        .unwrap();
    let cube = entry.cube().unwrap();
    assert!(cube.create().contains("WHERE \"region\" = 'west'"));
    // The template select over the cube itself never carries a WHERE.
    assert!(!cube.select().to_string().contains("WHERE"));
}

#[tokio::test]
async fn ddl_failure_is_logged_and_the_entry_stays_cached() {
    let coordinator = Arc::new(MockCoordinator::new());
    coordinator.set_fail_exec(true);
    let mut idx = indexer(&coordinator);
    let client = sales_client();
    let selection = MockSelection::new();
    let clause = point_clause("S", "category");

    let entry = idx.index(&client, &selection, &clause).unwrap();
    let state = entry.cube().unwrap().result().await;
    assert!(matches!(state, datacube::MaterializeState::Failed(_)));
    assert_eq!(coordinator.logged_errors().len(), 1);

    // The failed cube remains cached; no new DDL is attempted.
    let again = idx.index(&client, &selection, &clause).unwrap();
    assert!(Arc::ptr_eq(entry.cube().unwrap(), again.cube().unwrap()));
    assert_eq!(coordinator.batches().len(), 1);
}

#[tokio::test]
async fn schema_round_trip_preserves_table_names() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client = sales_client();
    let selection = MockSelection::new();
    let clause = point_clause("S", "category");

    let before = idx.index(&client, &selection, &clause).unwrap();
    let before_table = before.cube().unwrap().table().to_string();

    idx.set_schema("scratch");
    assert!(idx.is_empty());
    let scratch = idx.index(&client, &selection, &clause).unwrap();
    assert!(scratch.cube().unwrap().table().starts_with("scratch.cube_"));

    idx.set_schema("mosaic");
    let after = idx.index(&client, &selection, &clause).unwrap();
    assert_eq!(after.cube().unwrap().table(), before_table);
}

#[tokio::test]
async fn client_order_by_is_deferred_to_the_cube_select() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client: ClientHandle = Arc::new(
        TestClient::new("sales")
            .dim("year")
            .aggregate(sum(col("sales")).alias("s"))
            .order_by(col("year")),
    );
    let selection = MockSelection::new();

    let entry = idx
        .index(&client, &selection, &point_clause("S", "category"))
        .unwrap();
    let cube = entry.cube().unwrap();
    assert!(!cube.create().contains("ORDER BY"));
    assert!(cube.select().to_string().ends_with("ORDER BY \"year\""));
}

/// Client whose aggregation reads from a derived subquery.
#[derive(Debug)]
struct SubqueryClient;

impl VisualClient for SubqueryClient {
    fn query(&self, filter: Vec<SqlExpr>) -> SelectQuery {
        let mut inner = SelectQuery::new();
        inner.add_select(["year", "sales"]).from_table("raw");
        let mut q = SelectQuery::new();
        q.add_select(["year"])
            .add_select([sum(col("sales")).alias("s")])
            .from_query(inner, "t")
            .add_filter(filter)
            .add_group_by([col("year")]);
        q
    }

    fn index_columns(&self) -> Option<IndexColumns> {
        derive_index_columns(&self.query(Vec::new()))
    }
}

#[tokio::test]
async fn active_base_columns_are_pushed_into_subqueries() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client: ClientHandle = Arc::new(SubqueryClient);
    let selection = MockSelection::new();

    let entry = idx.index(&client, &selection, &interval_clause("brush")).unwrap();
    let cube = entry.cube().unwrap();
    assert!(cube
        .create()
        .contains("(SELECT \"year\", \"sales\", \"x\" FROM raw) AS t"));
}

#[tokio::test]
async fn cube_query_does_not_accumulate_where_terms() {
    let coordinator = Arc::new(MockCoordinator::new());
    let mut idx = indexer(&coordinator);
    let client = sales_client();
    let selection = MockSelection::new();

    let entry = idx.index(&client, &selection, &interval_clause("brush")).unwrap();
    let cube = entry.cube().unwrap();
    let value = ClausePredicate::Interval(IntervalBound::new(col("x"), Some([20.0, 40.0])));

    let first = cube.query(Some(&value)).to_string();
    let second = cube.query(Some(&value)).to_string();
    assert_eq!(first, second);
    assert_eq!(first.matches("BETWEEN").count(), 1);
}
