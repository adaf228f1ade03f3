use super::*;
use crate::expr::{col, lit};
use crate::test_utils::{counting_session, ints, loaded_session, sample_table};
use lq_db::Value;

#[tokio::test]
async fn test_open_in_memory() {
    let session = Session::open(&Config::default()).unwrap();
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(session.dialect(), DialectKind::DuckDb);

    let t = session.load_table("t", sample_table(), &[]).await.unwrap();
    let result = t.materialize().await.unwrap();
    assert_eq!(result.num_rows(), 3);
}

#[tokio::test]
async fn test_create_then_connect() {
    let session = Session::create(&Config::in_memory(DialectKind::DuckDb)).unwrap();
    assert_eq!(session.state(), SessionState::Created);
    assert!(matches!(
        session.bind("t").await,
        Err(LazyError::SessionNotOpen { .. })
    ));
    assert!(matches!(
        session.query("SELECT 1").await,
        Err(LazyError::SessionNotOpen { .. })
    ));

    session.connect().unwrap();
    assert_eq!(session.state(), SessionState::Open);
    // connecting twice is a no-op
    session.connect().unwrap();
    assert_eq!(session.state(), SessionState::Open);
}

#[tokio::test]
async fn test_file_backed_session_persists_tables() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lazy.duckdb");
    let config = Config::from_yaml_str(&format!(
        "database:\n  path: \"{}\"\n",
        path.display()
    ))
    .unwrap();

    let first = Session::open(&config).unwrap();
    first.load_table("t", sample_table(), &[]).await.unwrap();
    first.close().unwrap();
    drop(first);

    let second = Session::open(&config).unwrap();
    let t = second.bind("t").await.unwrap();
    assert_eq!(t.columns().unwrap(), &["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn test_bind_is_cached() {
    let (session, db) = loaded_session().await;
    let first = session.bind("t").await.unwrap();
    let calls = db.calls();
    let second = session.bind("t").await.unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(db.calls(), calls);
}

#[tokio::test]
async fn test_bind_existing_table() {
    let (session, db) = counting_session(DialectKind::DuckDb);
    db.execute_batch("CREATE TABLE people (id INTEGER, name VARCHAR)")
        .unwrap();
    let people = session.bind("people").await.unwrap();
    assert_eq!(
        people.columns().unwrap(),
        &["id".to_string(), "name".to_string()]
    );
}

#[tokio::test]
async fn test_bind_unknown_table() {
    let (session, _db) = loaded_session().await;
    match session.bind("missing").await {
        Err(LazyError::UnknownTable { table, session: id }) => {
            assert_eq!(table, "missing");
            assert_eq!(id, session.id());
        }
        other => panic!("expected UnknownTable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_load_table_with_indexes() {
    let (session, db) = counting_session(DialectKind::DuckDb);
    let t = session
        .load_table("t", sample_table(), &[&["a"], &["a", "b"]])
        .await
        .unwrap();
    // create_table plus one call per index
    assert_eq!(db.calls(), 3);
    assert_eq!(t.columns().unwrap(), &["a".to_string(), "b".to_string()]);

    let indexes = session
        .query("SELECT index_name FROM duckdb_indexes() WHERE table_name = 't' ORDER BY index_name")
        .await
        .unwrap();
    let names: Vec<String> = indexes
        .column_values("index_name")
        .unwrap()
        .into_iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();
    assert_eq!(names, vec!["idx_t_a", "idx_t_a_b"]);

    // the loaded relation is what bind returns
    assert_eq!(session.bind("t").await.unwrap().id(), t.id());
}

#[tokio::test]
async fn test_indexes_do_not_change_results() {
    let (plain, _db1) = counting_session(DialectKind::DuckDb);
    let (indexed, _db2) = counting_session(DialectKind::DuckDb);
    let a = plain.load_table("t", sample_table(), &[]).await.unwrap();
    let b = indexed
        .load_table("t", sample_table(), &[&["b"]])
        .await
        .unwrap();

    let pred = || col("b").gt(lit(15));
    let left = a.filter_by(pred()).unwrap().materialize().await.unwrap();
    let right = b.filter_by(pred()).unwrap().materialize().await.unwrap();
    assert_eq!(left.to_vecs(), right.to_vecs());
}

#[tokio::test]
async fn test_load_table_unknown_index_column() {
    let (session, db) = counting_session(DialectKind::DuckDb);
    let result = session.load_table("t", sample_table(), &[&["zzz"]]).await;
    assert!(matches!(result, Err(LazyError::Schema { .. })));
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn test_load_table_replaces_existing() {
    let (session, _db) = loaded_session().await;
    let data = TableData::new(["x"], vec![vec![Value::from("only")]]);
    let t = session.load_table("t", data, &[]).await.unwrap();
    assert_eq!(t.columns().unwrap(), &["x".to_string()]);
    assert_eq!(t.materialize().await.unwrap().num_rows(), 1);
}

#[tokio::test]
async fn test_load_ragged_rows_fails() {
    let (session, _db) = counting_session(DialectKind::DuckDb);
    let data = TableData::new(["a", "b"], vec![vec![Value::Integer(1)]]);
    assert!(matches!(
        session.load_table("t", data, &[]).await,
        Err(LazyError::Database(_))
    ));
}

#[tokio::test]
async fn test_sql_relation() {
    let (session, db) = loaded_session().await;
    let rel = session
        .sql("SELECT a, b * 2 AS doubled FROM t WHERE a >= 2")
        .await
        .unwrap();
    assert_eq!(
        rel.columns().unwrap(),
        &["a".to_string(), "doubled".to_string()]
    );

    let calls = db.calls();
    let rel = rel.filter_by(col("doubled").gt(lit(40))).unwrap();
    assert_eq!(db.calls(), calls);
    let result = rel.materialize().await.unwrap();
    assert_eq!(ints(result.column_values("a").unwrap()), vec![3]);
}

#[tokio::test]
async fn test_sql_rejects_non_queries() {
    let (session, db) = loaded_session().await;
    let calls = db.calls();
    assert!(matches!(
        session.sql("DROP TABLE t").await,
        Err(LazyError::InvalidQuery(_))
    ));
    assert!(matches!(
        session.sql("SELEC a FROM t").await,
        Err(LazyError::InvalidQuery(_))
    ));
    assert!(matches!(
        session.sql("   ").await,
        Err(LazyError::InvalidQuery(_))
    ));
    assert_eq!(db.calls(), calls);
}

#[tokio::test]
async fn test_sql_unknown_table_is_execution_error() {
    let (session, _db) = loaded_session().await;
    assert!(matches!(
        session.sql("SELECT * FROM nowhere").await,
        Err(LazyError::Execution { relation: None, .. })
    ));
}

#[tokio::test]
async fn test_raw_query_path() {
    let (session, _db) = loaded_session().await;
    let result = session
        .query("SELECT b FROM t WHERE a > 1 ORDER BY a")
        .await
        .unwrap();
    assert_eq!(ints(result.column_values("b").unwrap()), vec![20, 30]);

    assert!(matches!(
        session.query("SELECT * FROM nowhere").await,
        Err(LazyError::Execution { .. })
    ));
}

#[tokio::test]
async fn test_close_twice_fails() {
    let (session, _db) = loaded_session().await;
    session.close().unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(
        session.close(),
        Err(LazyError::AlreadyClosed { .. })
    ));
}

#[tokio::test]
async fn test_closed_session_rejects_everything() {
    let (session, _db) = loaded_session().await;
    session.close().unwrap();

    assert!(matches!(
        session.bind("t").await,
        Err(LazyError::SessionClosed { .. })
    ));
    assert!(matches!(
        session.load_table("u", sample_table(), &[]).await,
        Err(LazyError::SessionClosed { .. })
    ));
    assert!(matches!(
        session.sql("SELECT 1").await,
        Err(LazyError::SessionClosed { .. })
    ));
    assert!(matches!(
        session.query("SELECT 1").await,
        Err(LazyError::SessionClosed { .. })
    ));
    assert!(matches!(
        session.connect(),
        Err(LazyError::SessionClosed { .. })
    ));
}

#[tokio::test]
async fn test_close_created_session() {
    let session = Session::create(&Config::default()).unwrap();
    session.close().unwrap();
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = Config::default();
    config.database.path = String::new();
    assert!(matches!(
        Session::open(&config),
        Err(LazyError::ConfigInvalid { .. })
    ));
}

#[test]
fn test_index_name() {
    assert_eq!(index_name("t", &["a", "b"]), "idx_t_a_b");
    assert_eq!(index_name("main.t", &["my col"]), "idx_main_t_my_col");
}
