use super::*;
use std::io::Write;

#[test]
fn test_parse_empty_config_uses_defaults() {
    let config = Config::from_yaml_str("{}").unwrap();
    assert_eq!(config.dialect, DialectKind::DuckDb);
    assert_eq!(config.database.path, ":memory:");
    assert!(config.targets.is_empty());
}

#[test]
fn test_parse_full_config() {
    let yaml = r#"
dialect: snowflake
database:
  path: "./warehouse.duckdb"
targets:
  dev:
    database:
      path: ":memory:"
  ci:
    dialect: ansi
"#;
    let config = Config::from_yaml_str(yaml).unwrap();
    assert_eq!(config.dialect, DialectKind::Snowflake);
    assert_eq!(config.database.path, "./warehouse.duckdb");
    assert_eq!(config.targets.len(), 2);
}

#[test]
fn test_unknown_field_rejected() {
    let result = Config::from_yaml_str("dialect: duckdb\nthreads: 4\n");
    assert!(matches!(result, Err(LazyError::YamlParse(_))));
}

#[test]
fn test_unknown_dialect_rejected() {
    let result = Config::from_yaml_str("dialect: oracle\n");
    assert!(matches!(result, Err(LazyError::YamlParse(_))));
}

#[test]
fn test_empty_path_invalid() {
    let result = Config::from_yaml_str("database:\n  path: \"\"\n");
    assert!(matches!(result, Err(LazyError::ConfigInvalid { .. })));
}

#[test]
fn test_with_target_overrides() {
    let yaml = r#"
dialect: duckdb
database:
  path: "prod.duckdb"
targets:
  dev:
    database:
      path: ":memory:"
  ci:
    dialect: ansi
"#;
    let config = Config::from_yaml_str(yaml).unwrap();

    let dev = config.with_target("dev").unwrap();
    assert_eq!(dev.database.path, ":memory:");
    assert_eq!(dev.dialect, DialectKind::DuckDb);

    let ci = config.with_target("ci").unwrap();
    assert_eq!(ci.database.path, "prod.duckdb");
    assert_eq!(ci.dialect, DialectKind::Ansi);
}

#[test]
fn test_with_unknown_target() {
    let config = Config::from_yaml_str("targets:\n  dev: {}\n").unwrap();
    match config.with_target("prod") {
        Err(LazyError::ConfigInvalid { message }) => {
            assert!(message.contains("prod"));
            assert!(message.contains("dev"));
        }
        other => panic!("expected ConfigInvalid, got {:?}", other),
    }
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "dialect: ansi").unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.dialect, DialectKind::Ansi);
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::load(&dir.path().join("lazyquery.yml"));
    assert!(matches!(result, Err(LazyError::ConfigNotFound { .. })));
}

#[test]
fn test_in_memory() {
    let config = Config::in_memory(DialectKind::Snowflake);
    assert_eq!(config.dialect, DialectKind::Snowflake);
    assert_eq!(config.database.path, ":memory:");
}
