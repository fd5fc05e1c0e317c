// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Result comparison
//!
//! Pure structural comparison of an expected result against an actual one.
//! Nothing here performs I/O or mutates its inputs.
//!
//! - Status results: the six OK-packet fields are compared independently and
//!   every differing field is reported.
//! - Row sets: a length mismatch is reported on its own as
//!   [`Diff::RowCount`]; otherwise rows are compared in order and each
//!   differing index gets a [`RowDiff`].

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::result::{ActualResult, ExpectedResult, QueryResult, ResultShape, Row, StatusResult, Value};

/// Comparison verdict
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Fail(Diff),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// A status result field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusField {
    FieldCount,
    AffectedRows,
    InsertId,
    Info,
    ServerStatus,
    WarningStatus,
}

impl fmt::Display for StatusField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusField::FieldCount => "fieldCount",
            StatusField::AffectedRows => "affectedRows",
            StatusField::InsertId => "insertId",
            StatusField::Info => "info",
            StatusField::ServerStatus => "serverStatus",
            StatusField::WarningStatus => "warningStatus",
        };
        f.write_str(name)
    }
}

/// One mismatched status field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiff {
    pub field: StatusField,
    pub expected: String,
    pub actual: String,
}

/// One mismatched cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueDiff {
    pub column: String,
    pub expected: Value,
    pub actual: Value,
}

/// Differences within a single row index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDiff {
    pub index: usize,
    /// Columns present in the expected row only
    pub missing_columns: Vec<String>,
    /// Columns present in the actual row only
    pub unexpected_columns: Vec<String>,
    pub values: Vec<ValueDiff>,
}

/// Why a comparison failed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diff {
    /// Expected a status result but got rows, or the other way round
    Shape {
        expected: ResultShape,
        actual: ResultShape,
    },
    Status { fields: Vec<FieldDiff> },
    RowCount { expected: usize, actual: usize },
    Rows { rows: Vec<RowDiff> },
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diff::Shape { expected, actual } => {
                write!(f, "expected a {}, received a {}", expected, actual)
            }
            Diff::Status { fields } => {
                for (i, d) in fields.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}: expected {}, received {}", d.field, d.expected, d.actual)?;
                }
                Ok(())
            }
            Diff::RowCount { expected, actual } => {
                write!(f, "row count: expected {}, received {}", expected, actual)
            }
            Diff::Rows { rows } => {
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "row {}:", row.index)?;
                    for column in &row.missing_columns {
                        write!(f, "\n  missing column {}", column)?;
                    }
                    for column in &row.unexpected_columns {
                        write!(f, "\n  unexpected column {}", column)?;
                    }
                    for v in &row.values {
                        write!(f, "\n  {}: expected {}, received {}", v.column, v.expected, v.actual)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Compare an expected result against an actual one
pub fn compare(expected: &ExpectedResult, actual: &ActualResult) -> Verdict {
    match (expected, actual) {
        (QueryResult::Status(e), QueryResult::Status(a)) => compare_status(e, a),
        (QueryResult::Rows(e), QueryResult::Rows(a)) => compare_rows(e, a),
        _ => compare_shape(expected, actual),
    }
}

/// Compare only the result shape, ignoring contents
pub fn compare_shape(expected: &ExpectedResult, actual: &ActualResult) -> Verdict {
    if expected.shape() == actual.shape() {
        Verdict::Pass
    } else {
        Verdict::Fail(Diff::Shape {
            expected: expected.shape(),
            actual: actual.shape(),
        })
    }
}

fn field_diff<T: PartialEq + ToString>(
    out: &mut Vec<FieldDiff>,
    field: StatusField,
    expected: &T,
    actual: &T,
) {
    if expected != actual {
        out.push(FieldDiff {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
}

/// Compare two status results field by field
pub fn compare_status(expected: &StatusResult, actual: &StatusResult) -> Verdict {
    let mut fields = Vec::new();
    field_diff(&mut fields, StatusField::FieldCount, &expected.field_count, &actual.field_count);
    field_diff(&mut fields, StatusField::AffectedRows, &expected.affected_rows, &actual.affected_rows);
    field_diff(&mut fields, StatusField::InsertId, &expected.insert_id, &actual.insert_id);
    field_diff(
        &mut fields,
        StatusField::Info,
        &format!("{:?}", expected.info),
        &format!("{:?}", actual.info),
    );
    field_diff(&mut fields, StatusField::ServerStatus, &expected.server_status, &actual.server_status);
    field_diff(&mut fields, StatusField::WarningStatus, &expected.warning_status, &actual.warning_status);

    if fields.is_empty() {
        Verdict::Pass
    } else {
        Verdict::Fail(Diff::Status { fields })
    }
}

fn diff_row(index: usize, expected: &Row, actual: &Row) -> Option<RowDiff> {
    let expected_columns: BTreeSet<&String> = expected.keys().collect();
    let actual_columns: BTreeSet<&String> = actual.keys().collect();

    let missing_columns: Vec<String> = expected_columns
        .difference(&actual_columns)
        .map(|c| c.to_string())
        .collect();
    let unexpected_columns: Vec<String> = actual_columns
        .difference(&expected_columns)
        .map(|c| c.to_string())
        .collect();
    let values: Vec<ValueDiff> = expected
        .iter()
        .filter_map(|(column, e)| {
            let a = actual.get(column)?;
            (e != a).then(|| ValueDiff {
                column: column.clone(),
                expected: e.clone(),
                actual: a.clone(),
            })
        })
        .collect();

    if missing_columns.is_empty() && unexpected_columns.is_empty() && values.is_empty() {
        None
    } else {
        Some(RowDiff {
            index,
            missing_columns,
            unexpected_columns,
            values,
        })
    }
}

/// Compare two row sets in order
pub fn compare_rows(expected: &[Row], actual: &[Row]) -> Verdict {
    if expected.len() != actual.len() {
        return Verdict::Fail(Diff::RowCount {
            expected: expected.len(),
            actual: actual.len(),
        });
    }

    let rows: Vec<RowDiff> = expected
        .iter()
        .zip(actual)
        .enumerate()
        .filter_map(|(i, (e, a))| diff_row(i, e, a))
        .collect();

    if rows.is_empty() {
        Verdict::Pass
    } else {
        Verdict::Fail(Diff::Rows { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::row;
    use proptest::prelude::*;

    fn databases(names: &[&str]) -> Vec<Row> {
        names.iter().map(|n| row([("Database", *n)])).collect()
    }

    #[test]
    fn test_equal_status_passes() {
        let a = StatusResult::ok(1);
        assert_eq!(compare_status(&a, &a.clone()), Verdict::Pass);
    }

    #[test]
    fn test_each_status_field_flips_verdict() {
        let base = StatusResult::ok(0);
        let cases: Vec<(StatusField, StatusResult)> = vec![
            (StatusField::FieldCount, StatusResult { field_count: 1, ..base.clone() }),
            (StatusField::AffectedRows, StatusResult { affected_rows: 5, ..base.clone() }),
            (StatusField::InsertId, StatusResult { insert_id: 9, ..base.clone() }),
            (StatusField::Info, StatusResult { info: "Records: 1".into(), ..base.clone() }),
            (StatusField::ServerStatus, StatusResult { server_status: 0, ..base.clone() }),
            (StatusField::WarningStatus, StatusResult { warning_status: 1, ..base.clone() }),
        ];

        for (field, changed) in cases {
            match compare_status(&base, &changed) {
                Verdict::Fail(Diff::Status { fields }) => {
                    assert_eq!(fields.len(), 1, "only {} should differ", field);
                    assert_eq!(fields[0].field, field);
                }
                other => panic!("expected status diff for {}, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_all_differing_fields_reported() {
        let expected = StatusResult::ok(1);
        let actual = StatusResult {
            affected_rows: 0,
            warning_status: 2,
            ..expected.clone()
        };
        let Verdict::Fail(diff) = compare_status(&expected, &actual) else {
            panic!("expected failure");
        };
        let text = diff.to_string();
        assert!(text.contains("affectedRows: expected 1, received 0"));
        assert!(text.contains("warningStatus: expected 0, received 2"));
    }

    #[test]
    fn test_identical_rows_pass() {
        let rows = databases(&["information_schema", "mysql", "new_db"]);
        assert!(compare_rows(&rows, &rows.clone()).is_pass());
    }

    #[test]
    fn test_reordered_rows_fail() {
        let expected = databases(&["a", "b", "c"]);
        let actual = databases(&["a", "c", "b"]);
        let Verdict::Fail(Diff::Rows { rows }) = compare_rows(&expected, &actual) else {
            panic!("expected row diff");
        };
        assert_eq!(rows.iter().map(|r| r.index).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_truncated_rows_report_count_only() {
        let expected = databases(&["information_schema", "mysql", "db", "db/main"]);
        let actual = databases(&["information_schema", "mysql", "db"]);
        assert_eq!(
            compare_rows(&expected, &actual),
            Verdict::Fail(Diff::RowCount { expected: 4, actual: 3 })
        );
    }

    #[test]
    fn test_column_set_mismatch() {
        let expected = vec![row([("Database", "mysql")])];
        let actual = vec![row([("Schema", "mysql")])];
        let Verdict::Fail(Diff::Rows { rows }) = compare_rows(&expected, &actual) else {
            panic!("expected row diff");
        };
        assert_eq!(rows[0].missing_columns, vec!["Database".to_string()]);
        assert_eq!(rows[0].unexpected_columns, vec!["Schema".to_string()]);
        assert!(rows[0].values.is_empty());
    }

    #[test]
    fn test_numeric_cells_compare_by_value() {
        let expected = vec![row([("n", Value::Int(2))])];
        let actual = vec![row([("n", Value::Float(2.0))])];
        assert!(compare_rows(&expected, &actual).is_pass());
    }

    #[test]
    fn test_shape_mismatch() {
        let expected = QueryResult::Status(StatusResult::ok(0));
        let actual = QueryResult::Rows(vec![]);
        assert_eq!(
            compare(&expected, &actual),
            Verdict::Fail(Diff::Shape {
                expected: ResultShape::Status,
                actual: ResultShape::Rows,
            })
        );
    }

    #[test]
    fn test_compare_does_not_mutate_inputs() {
        let expected = QueryResult::Rows(databases(&["a"]));
        let actual = QueryResult::Rows(databases(&["b"]));
        let (e0, a0) = (expected.clone(), actual.clone());
        let _ = compare(&expected, &actual);
        assert_eq!(expected, e0);
        assert_eq!(actual, a0);
    }

    fn status_strategy() -> impl Strategy<Value = StatusResult> {
        (any::<u64>(), any::<u64>(), any::<u64>(), "[ -~]{0,12}", any::<u16>(), any::<u16>()).prop_map(
            |(field_count, affected_rows, insert_id, info, server_status, warning_status)| StatusResult {
                field_count,
                affected_rows,
                insert_id,
                info,
                server_status,
                warning_status,
            },
        )
    }

    const FIELDS: [StatusField; 6] = [
        StatusField::FieldCount,
        StatusField::AffectedRows,
        StatusField::InsertId,
        StatusField::Info,
        StatusField::ServerStatus,
        StatusField::WarningStatus,
    ];

    fn flip(status: &StatusResult, field: StatusField) -> StatusResult {
        let mut changed = status.clone();
        match field {
            StatusField::FieldCount => changed.field_count ^= 1,
            StatusField::AffectedRows => changed.affected_rows ^= 1,
            StatusField::InsertId => changed.insert_id ^= 1,
            StatusField::Info => changed.info.push('!'),
            StatusField::ServerStatus => changed.server_status ^= 1,
            StatusField::WarningStatus => changed.warning_status ^= 1,
        }
        changed
    }

    fn distinct_rows() -> impl Strategy<Value = (Vec<Row>, Vec<Row>)> {
        proptest::collection::btree_set("[a-z]{1,6}", 2..8).prop_flat_map(|names| {
            let rows: Vec<Row> = names.into_iter().map(|n| row([("Database", n)])).collect();
            (Just(rows.clone()), Just(rows).prop_shuffle())
        })
    }

    proptest! {
        #[test]
        fn prop_single_field_flip_reports_that_field(
            base in status_strategy(),
            pick in 0..FIELDS.len(),
        ) {
            let field = FIELDS[pick];
            let changed = flip(&base, field);
            prop_assert_eq!(compare_status(&base, &base.clone()), Verdict::Pass);
            match compare_status(&base, &changed) {
                Verdict::Fail(Diff::Status { fields }) => {
                    prop_assert_eq!(fields.len(), 1);
                    prop_assert_eq!(fields[0].field, field);
                }
                other => prop_assert!(false, "expected status diff for {}, got {:?}", field, other),
            }
        }

        #[test]
        fn prop_reordered_distinct_rows_fail((expected, actual) in distinct_rows()) {
            prop_assume!(expected != actual);
            let verdict = compare_rows(&expected, &actual);
            prop_assert!(matches!(verdict, Verdict::Fail(Diff::Rows { .. })), "{:?}", verdict);
        }

        #[test]
        fn prop_truncation_reports_row_count_only(
            names in proptest::collection::vec("[a-z]{0,4}", 1..10),
            cut in any::<proptest::sample::Index>(),
        ) {
            let full = databases(&names.iter().map(String::as_str).collect::<Vec<_>>());
            let kept = cut.index(full.len());
            let truncated = &full[..kept];

            prop_assert_eq!(
                compare_rows(&full, truncated),
                Verdict::Fail(Diff::RowCount { expected: full.len(), actual: kept })
            );
            prop_assert_eq!(
                compare_rows(truncated, &full),
                Verdict::Fail(Diff::RowCount { expected: kept, actual: full.len() })
            );
        }
    }
}
