use crate::error::{InjectedError, MockError};
use crate::types::{Row, Value};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Canned outcome of an Exec call.
#[derive(Debug, Clone)]
pub struct ExecResult {
    inner: ExecResultInner,
}

#[derive(Debug, Clone)]
enum ExecResultInner {
    Counts {
        last_insert_id: i64,
        rows_affected: i64,
    },
    Failed(InjectedError),
}

impl ExecResult {
    pub fn new(last_insert_id: i64, rows_affected: i64) -> Self {
        Self {
            inner: ExecResultInner::Counts {
                last_insert_id,
                rows_affected,
            },
        }
    }

    /// A result whose accessors both fail with `err`. The Exec call itself
    /// still succeeds.
    pub fn from_error(err: InjectedError) -> Self {
        Self {
            inner: ExecResultInner::Failed(err),
        }
    }

    pub fn last_insert_id(&self) -> Result<i64, MockError> {
        match &self.inner {
            ExecResultInner::Counts { last_insert_id, .. } => Ok(*last_insert_id),
            ExecResultInner::Failed(err) => Err(MockError::ResultUnavailable {
                field: "last insert id",
                source: err.clone(),
            }),
        }
    }

    pub fn rows_affected(&self) -> Result<i64, MockError> {
        match &self.inner {
            ExecResultInner::Counts { rows_affected, .. } => Ok(*rows_affected),
            ExecResultInner::Failed(err) => Err(MockError::ResultUnavailable {
                field: "rows affected",
                source: err.clone(),
            }),
        }
    }
}

impl PartialEq for ExecResult {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (
                ExecResultInner::Counts {
                    last_insert_id: a_id,
                    rows_affected: a_rows,
                },
                ExecResultInner::Counts {
                    last_insert_id: b_id,
                    rows_affected: b_rows,
                },
            ) => a_id == b_id && a_rows == b_rows,
            (ExecResultInner::Failed(a), ExecResultInner::Failed(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Canned outcome of a Query call, and the row iterator handed back to the
/// caller.
///
/// Iteration yields each row in order. A row error registered at index `i`
/// is yielded in place of row `i` and ends the iteration; an error at
/// `rows().len()` is yielded after the last row.
#[derive(Debug, Clone, Default)]
pub struct Rows {
    columns: Vec<String>,
    rows: Vec<Row>,
    row_errors: BTreeMap<usize, InjectedError>,
    cursor: usize,
    exhausted: bool,
}

#[derive(Debug, Deserialize)]
struct RowsFixture {
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

impl Rows {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn add_row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(Row::from_values(values));
        self
    }

    pub fn row_error(mut self, index: usize, err: InjectedError) -> Self {
        self.row_errors.insert(index, err);
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Every row must carry exactly one value per column.
    pub fn validate(&self) -> Result<(), MockError> {
        for (index, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(MockError::Fixture(format!(
                    "row {index} has {} values but {} columns are declared",
                    row.len(),
                    self.columns.len()
                )));
            }
        }
        Ok(())
    }

    /// Parses comma-separated rows with standard CSV quoting (quoted cells may
    /// hold commas, `""` inside quotes is a literal quote). Cells are trimmed.
    /// `NULL` becomes `Value::Null` and numeric cells become integers or
    /// floats, whether quoted or not. Anything else is text.
    pub fn from_csv_str(columns: &[&str], text: &str) -> Result<Self, MockError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        let mut rows = Rows::new(columns);
        for record in reader.records() {
            let record = record.map_err(|e| MockError::Fixture(format!("invalid csv: {e}")))?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            rows = rows.add_row(record.iter().map(parse_csv_cell).collect());
        }
        rows.validate()?;
        Ok(rows)
    }

    /// Loads `{"columns": [...], "rows": [[...], ...]}`.
    pub fn from_json_str(json: &str) -> Result<Self, MockError> {
        let fixture: RowsFixture = serde_json::from_str(json)
            .map_err(|e| MockError::Fixture(format!("invalid rows json: {e}")))?;
        let rows = Rows {
            columns: fixture.columns,
            rows: fixture
                .rows
                .into_iter()
                .map(|cells| Row::from_values(cells.into_iter().map(Value::from_json).collect()))
                .collect(),
            ..Rows::default()
        };
        rows.validate()?;
        Ok(rows)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, MockError> {
        let text = fs::read_to_string(path)
            .map_err(|e| MockError::Fixture(format!("read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }
}

fn parse_csv_cell(cell: &str) -> Value {
    if cell == "NULL" {
        return Value::Null;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = cell.parse::<f64>() {
        return Value::Float(f);
    }
    Value::Text(cell.into())
}

impl Iterator for Rows {
    type Item = Result<Row, MockError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        if let Some(err) = self.row_errors.get(&self.cursor) {
            self.exhausted = true;
            return Some(Err(MockError::Injected(err.clone())));
        }
        let Some(row) = self.rows.get(self.cursor) else {
            self.exhausted = true;
            return None;
        };
        self.cursor += 1;
        Some(Ok(row.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::{ExecResult, Rows};
    use crate::error::{InjectedError, MockErrorCode};
    use crate::types::Value;

    #[test]
    fn exec_result_error_fails_both_accessors() {
        let err = InjectedError::msg("no insert id");
        let result = ExecResult::from_error(err.clone());
        let last = result.last_insert_id().expect_err("accessor should fail");
        assert_eq!(last.code(), MockErrorCode::ResultUnavailable);
        assert!(result.rows_affected().is_err());
        assert_eq!(result, ExecResult::from_error(err));
        assert_ne!(result, ExecResult::from_error(InjectedError::msg("no insert id")));
    }

    #[test]
    fn rows_iterate_then_stop_at_row_error() {
        let rows = Rows::new(&["id"])
            .add_row(vec![Value::Integer(1)])
            .add_row(vec![Value::Integer(2)])
            .row_error(1, InjectedError::msg("row 2 corrupt"));
        let out: Vec<_> = rows.collect();
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].as_ref().expect("first row").values,
            vec![Value::Integer(1)]
        );
        let err = out[1].as_ref().expect_err("second row should fail");
        assert_eq!(err.to_string(), "row 2 corrupt");
    }

    #[test]
    fn row_error_after_last_row_is_yielded_last() {
        let rows = Rows::new(&["id"])
            .add_row(vec![Value::Integer(1)])
            .row_error(1, InjectedError::msg("cursor lost"));
        let out: Vec<_> = rows.collect();
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn csv_cells_are_typed() {
        let text = "1,\"bob\", 2.5\n\n2 , alice,NULL\n";
        let rows = Rows::from_csv_str(&["id", "name", "score"], text).expect("csv");
        assert_eq!(rows.rows().len(), 2);
        assert_eq!(
            rows.rows()[0].values,
            vec![Value::Integer(1), Value::from("bob"), Value::Float(2.5)]
        );
        assert_eq!(rows.rows()[1].values[2], Value::Null);
    }

    #[test]
    fn csv_quoted_cell_keeps_its_comma() {
        let rows = Rows::from_csv_str(&["id", "name"], "1,\"Smith, John\"\n").expect("csv");
        assert_eq!(
            rows.rows()[0].values,
            vec![Value::Integer(1), Value::from("Smith, John")]
        );
    }

    #[test]
    fn csv_doubled_quote_is_unescaped() {
        let rows = Rows::from_csv_str(&["name"], "\"say \"\"hi\"\"\"\n").expect("csv");
        assert_eq!(rows.rows()[0].values, vec![Value::from("say \"hi\"")]);
    }

    #[test]
    fn csv_width_mismatch_is_rejected() {
        let err = Rows::from_csv_str(&["id", "name"], "1").expect_err("too few cells");
        assert_eq!(err.code(), MockErrorCode::Fixture);
    }

    #[test]
    fn json_fixture_converts_cells() {
        let rows = Rows::from_json_str(
            r#"{"columns": ["id", "active", "tags"], "rows": [[7, true, ["a"]], [8, false, null]]}"#,
        )
        .expect("json");
        assert_eq!(rows.columns(), &["id", "active", "tags"]);
        assert_eq!(
            rows.rows()[0].values,
            vec![
                Value::Integer(7),
                Value::Boolean(true),
                Value::Json(r#"["a"]"#.into())
            ]
        );
        assert_eq!(rows.rows()[1].values[2], Value::Null);
    }

    #[test]
    fn json_fixture_reports_parse_errors() {
        let err = Rows::from_json_str("{not json").expect_err("invalid json");
        assert!(err.to_string().contains("invalid rows json"));
    }
}
