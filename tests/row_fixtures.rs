use sqlmock::{MockConfig, MockDriver, MockErrorCode, Rows, Value};
use std::fs;
use tempfile::tempdir;

const USERS_JSON: &str = r#"{
    "columns": ["id", "name", "verified", "meta"],
    "rows": [
        [1, "bob", true, {"plan": "pro"}],
        [2, "alice", false, null]
    ]
}"#;

#[test]
fn json_fixture_file_feeds_a_query() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("users.json");
    fs::write(&path, USERS_JSON).expect("write fixture");

    let driver = MockDriver::new();
    let (conn, mock) = driver.open_new(MockConfig::default());
    mock.expect_query("SELECT (.+) FROM users")
        .expect("pattern")
        .will_return_rows(Rows::from_json_file(&path).expect("load fixture"));

    let rows: Vec<_> = conn
        .query("SELECT id, name, verified, meta FROM users", &[])
        .expect("query")
        .expect("rows")
        .collect::<Result<_, _>>()
        .expect("all rows readable");
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].values,
        vec![
            Value::Integer(1),
            Value::from("bob"),
            Value::Boolean(true),
            Value::Json(r#"{"plan":"pro"}"#.into()),
        ]
    );
    assert!(rows[1].values[3].is_null());
    mock.expectations_were_met().expect("script drained");
}

#[test]
fn missing_fixture_file_is_a_fixture_error() {
    let dir = tempdir().expect("temp dir");
    let err = Rows::from_json_file(&dir.path().join("absent.json")).expect_err("missing file");
    assert_eq!(err.code(), MockErrorCode::Fixture);
}

#[test]
fn csv_fixture_feeds_a_query() {
    let driver = MockDriver::new();
    let (conn, mock) = driver.open_new(MockConfig::default());
    let rows = Rows::from_csv_str(&["id", "title"], "1,hello world\n2,NULL\n").expect("csv");
    mock.expect_query("SELECT id, title FROM posts")
        .expect("pattern")
        .with_values([10i64])
        .will_return_rows(rows);

    let titles: Vec<Value> = conn
        .query("SELECT id, title FROM posts LIMIT ?", &[Value::Integer(10)])
        .expect("query")
        .expect("rows")
        .map(|row| row.expect("row").values[1].clone())
        .collect();
    assert_eq!(titles, vec![Value::from("hello world"), Value::Null]);
}
