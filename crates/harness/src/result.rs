// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Query result shapes
//!
//! Both the expected side (declared in fixtures) and the actual side
//! (returned by a [`Session`](crate::db::Session)) use [`QueryResult`]:
//! either a status response for DDL/DML-style commands or an ordered row set
//! for query-style commands.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// `SERVER_STATUS_IN_TRANS` flag
pub const SERVER_STATUS_IN_TRANS: u16 = 0x0001;

/// `SERVER_STATUS_AUTOCOMMIT` flag
pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;

/// A single cell value
///
/// Numbers compare by value across the integer/float split; text compares
/// exactly and never coerces into a number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// `i == f` without rounding `i` through `f64`
fn int_eq_float(i: i64, f: f64) -> bool {
    let bound = -(i64::MIN as f64);
    f.fract() == 0.0 && f >= i64::MIN as f64 && f < bound && f as i64 == i
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(i), Value::Float(f)) | (Value::Float(f), Value::Int(i)) => int_eq_float(*i, *f),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

/// One result row: column name to value
pub type Row = BTreeMap<String, Value>;

/// Build a row from `(column, value)` pairs
pub fn row<I, K, V>(cells: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    cells
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Outcome of a non-row-returning command (the MySQL OK packet)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatusResult {
    pub field_count: u64,
    pub affected_rows: u64,
    pub insert_id: u64,
    pub info: String,
    pub server_status: u16,
    pub warning_status: u16,
}

impl StatusResult {
    /// An OK response with autocommit set and the given affected row count
    pub fn ok(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            server_status: SERVER_STATUS_AUTOCOMMIT,
            ..Default::default()
        }
    }
}

/// Which arm of [`QueryResult`] a value is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    Status,
    Rows,
}

impl fmt::Display for ResultShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultShape::Status => write!(f, "status result"),
            ResultShape::Rows => write!(f, "row set"),
        }
    }
}

/// Result of one statement, expected or actual
///
/// In YAML this is written as a single-key map, either `status:` with the
/// six OK-packet fields or `rows:` with a list of column maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "RawQueryResult")]
pub enum QueryResult {
    Status(StatusResult),
    Rows(Vec<Row>),
}

/// Expected result of a fixture case
pub type ExpectedResult = QueryResult;

/// Result observed from the system under test
pub type ActualResult = QueryResult;

impl QueryResult {
    pub fn shape(&self) -> ResultShape {
        match self {
            QueryResult::Status(_) => ResultShape::Status,
            QueryResult::Rows(_) => ResultShape::Rows,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawQueryResult {
    #[serde(default)]
    status: Option<StatusResult>,
    #[serde(default)]
    rows: Option<Vec<Row>>,
}

impl TryFrom<RawQueryResult> for QueryResult {
    type Error = String;

    fn try_from(raw: RawQueryResult) -> Result<Self, Self::Error> {
        match (raw.status, raw.rows) {
            (Some(status), None) => Ok(QueryResult::Status(status)),
            (None, Some(rows)) => Ok(QueryResult::Rows(rows)),
            (Some(_), Some(_)) => Err("expected result must be either `status` or `rows`, not both".to_string()),
            (None, None) => Err("expected result needs a `status` or `rows` entry".to_string()),
        }
    }
}
