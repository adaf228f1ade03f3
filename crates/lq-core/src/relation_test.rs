use super::*;
use crate::expr::{col, lit, raw};
use crate::step::JoinSpec;
use crate::test_utils::{loaded_session, sample_table};

#[tokio::test]
async fn test_building_never_touches_engine() {
    let (session, db) = loaded_session().await;
    let t = session.bind("t").await.unwrap();
    let calls = db.calls();

    let rel = t
        .filter_by(col("a").gt(lit(1)))
        .unwrap()
        .mutate([("c", col("a").plus(col("b")))])
        .unwrap()
        .group_aggregate(["a"], [Aggregation::sum("total", col("c"))])
        .unwrap()
        .sort_by([SortKey::desc("total")])
        .unwrap()
        .join(&t, JoinSpec::left(["a"]))
        .unwrap()
        .inject_raw("WHERE total > 0")
        .unwrap()
        .limit(10)
        .unwrap();
    rel.show_query().unwrap();

    assert_eq!(db.calls(), calls);
    assert_eq!(rel.row_count(), RowCount::Unknown);
}

#[tokio::test]
async fn test_transformations_do_not_modify_parent() {
    let (session, _db) = loaded_session().await;
    let t = session.bind("t").await.unwrap();
    let before = t.show_query().unwrap();

    let projected = t.project(["b"]).unwrap();
    assert_eq!(t.columns().unwrap(), &["a".to_string(), "b".to_string()]);
    assert_eq!(projected.columns().unwrap(), &["b".to_string()]);
    assert_eq!(t.show_query().unwrap(), before);
    assert!(projected.id() > t.id());
    assert_eq!(projected.parent().unwrap().id(), t.id());
}

#[tokio::test]
async fn test_unknown_column_fails_fast() {
    let (session, _db) = loaded_session().await;
    let t = session.bind("t").await.unwrap();

    match t.project(["a", "zzz"]) {
        Err(LazyError::Schema {
            relation,
            operation,
            column,
            available,
        }) => {
            assert_eq!(relation, t.id());
            assert_eq!(operation, "project");
            assert_eq!(column, "zzz");
            assert_eq!(available, "a, b");
        }
        other => panic!("expected Schema error, got {:?}", other),
    }

    assert!(matches!(
        t.filter_by(col("nope").is_null()),
        Err(LazyError::Schema { .. })
    ));
    assert!(matches!(
        t.sort_by([SortKey::asc("nope")]),
        Err(LazyError::Schema { .. })
    ));
    assert!(matches!(
        t.group_aggregate(["a"], [Aggregation::max("m", col("nope"))]),
        Err(LazyError::Schema { .. })
    ));
    assert!(matches!(
        t.join(&t, JoinSpec::inner(Vec::<String>::new()).on("a", "nope")),
        Err(LazyError::Schema { .. })
    ));
}

#[tokio::test]
async fn test_column_names_match_case_insensitively() {
    let (session, _db) = loaded_session().await;
    let t = session.bind("t").await.unwrap();
    assert!(t.project(["A"]).is_ok());
}

#[tokio::test]
async fn test_project_after_aggregate_sees_aggregate_output() {
    let (session, _db) = loaded_session().await;
    let t = session.bind("t").await.unwrap();
    let agg = t
        .group_aggregate(["a"], [Aggregation::count_star("n")])
        .unwrap();
    assert_eq!(agg.columns().unwrap(), &["a".to_string(), "n".to_string()]);
    assert!(agg.project(["n"]).is_ok());
    assert!(matches!(agg.project(["b"]), Err(LazyError::Schema { .. })));
}

#[tokio::test]
async fn test_empty_projection_rejected() {
    let (session, db) = loaded_session().await;
    let t = session.bind("t").await.unwrap();
    let calls = db.calls();

    match t.project(Vec::<String>::new()) {
        Err(LazyError::Translation {
            relation,
            operation,
            ..
        }) => {
            assert_eq!(relation, t.id());
            assert_eq!(operation, "project");
        }
        other => panic!("expected Translation error, got {:?}", other),
    }
    // also when the input columns are unknown
    let raw_rel = t.inject_raw("WHERE a > 1").unwrap();
    assert!(matches!(
        raw_rel.project(Vec::<String>::new()),
        Err(LazyError::Translation { .. })
    ));
    assert_eq!(db.calls(), calls);
}

#[tokio::test]
async fn test_projection_declares_realized_columns() {
    let (session, _db) = loaded_session().await;
    let t = session.bind("t").await.unwrap();
    let rel = t.project(["b"]).unwrap();
    let result = rel.materialize().await.unwrap();
    assert_eq!(rel.columns().unwrap(), result.columns());
}

#[tokio::test]
async fn test_raw_fragment_defers_schema_checks() {
    let (session, _db) = loaded_session().await;
    let t = session.bind("t").await.unwrap();
    let raw_rel = t.inject_raw("WHERE a > 1").unwrap();
    assert!(raw_rel.columns().is_none());

    // unknown schema: no fail-fast
    let rel = raw_rel.filter_by(col("whatever").eq(lit(1))).unwrap();
    assert!(rel.columns().is_none());
    assert!(raw_rel.filter_by(raw("1 = 1")).is_ok());
}

#[tokio::test]
async fn test_mutate_columns() {
    let (session, _db) = loaded_session().await;
    let t = session.bind("t").await.unwrap();
    let rel = t
        .mutate([("b", col("b").times(lit(2))), ("c", lit(0))])
        .unwrap();
    assert_eq!(
        rel.columns().unwrap(),
        &["a".to_string(), "b".to_string(), "c".to_string()]
    );
}

#[tokio::test]
async fn test_join_columns() {
    let (session, _db) = loaded_session().await;
    let t = session.bind("t").await.unwrap();
    let u = session
        .load_table("u", sample_table(), &[])
        .await
        .unwrap()
        .mutate([("c", lit(1))])
        .unwrap();

    let inner = t.join(&u, JoinSpec::inner(["a"])).unwrap();
    assert_eq!(
        inner.columns().unwrap(),
        &["a", "b_x", "b_y", "c"].map(String::from)
    );

    let semi = t.join(&u, JoinSpec::semi(["a"])).unwrap();
    assert_eq!(semi.columns().unwrap(), &["a", "b"].map(String::from));

    let unknown = t.join(&u.inject_raw("LIMIT 1").unwrap(), JoinSpec::inner(["a"])).unwrap();
    assert!(unknown.columns().is_none());
}

#[tokio::test]
async fn test_join_key_case_matches_realized_columns() {
    let (session, _db) = loaded_session().await;
    let t = session.bind("t").await.unwrap();
    let u = session
        .load_table("u", sample_table(), &[])
        .await
        .unwrap()
        .mutate([("c", lit(1))])
        .unwrap()
        .project(["a", "c"])
        .unwrap();

    let rel = t.join(&u, JoinSpec::inner(["A"])).unwrap();
    assert_eq!(rel.columns().unwrap(), &["a", "b", "c"].map(String::from));
    let result = rel.materialize().await.unwrap();
    assert_eq!(rel.columns().unwrap(), result.columns());
    assert_eq!(result.num_rows(), 3);
}

#[tokio::test]
async fn test_closed_session_rejects_transformations() {
    let (session, _db) = loaded_session().await;
    let t = session.bind("t").await.unwrap();
    session.close().unwrap();

    assert!(matches!(t.project(["a"]), Err(LazyError::SessionClosed { .. })));
    assert!(matches!(t.limit(1), Err(LazyError::SessionClosed { .. })));
    assert!(matches!(t.show_query(), Err(LazyError::SessionClosed { .. })));
}

#[tokio::test]
async fn test_dropped_session_counts_as_closed() {
    let (session, db) = loaded_session().await;
    let t = session.bind("t").await.unwrap();
    drop(session);
    drop(db);

    match t.materialize().await {
        Err(LazyError::SessionClosed { session }) => assert_eq!(session, t.session_id()),
        other => panic!("expected SessionClosed, got {:?}", other),
    }
}

#[test]
fn test_relation_id_display() {
    let id = RelationId::next();
    assert_eq!(id.to_string(), format!("r{}", id.as_u64()));
    assert!(RelationId::next() > id);
}
