// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Fixture suite loader
//!
//! Parses declarative fixture suites from YAML into ordered, immutable
//! [`TestCase`] sequences. A [`SharedContext`] is injected at load time:
//! every `${name}` in the suite's strings is replaced by the context value,
//! so the same file works against different target environments.
//!
//! ```yaml
//! name: databases
//! isolation: shared
//! cases:
//!   - query: USE ::dbName
//!     params:
//!       dbName: "${dbName}/main"
//!     expect:
//!       status: { fieldCount: 0, affectedRows: 0, insertId: 0, info: "", serverStatus: 2, warningStatus: 0 }
//!   - query: SHOW DATABASES
//!     expect:
//!       rows:
//!         - { Database: information_schema }
//! ```
//!
//! Loading never touches the network.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::LoadError;
use crate::placeholder;
use crate::result::{ExpectedResult, QueryResult, Row, Value};

/// Whether a suite may run concurrently with other suites
///
/// Every suite must declare this; nothing is inferred from names or content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Owns its server state; safe to run on its own session in parallel
    Isolated,
    /// Shares server or schema state; runs serially
    Shared,
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Isolation::Isolated => write!(f, "isolated"),
            Isolation::Shared => write!(f, "shared"),
        }
    }
}

/// Values injected into fixtures at load time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedContext {
    values: BTreeMap<String, String>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Replace every `${name}` in `text`; `$${` yields a literal `${`
    pub fn interpolate(&self, text: &str) -> Result<String, LoadError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(idx) = rest.find('$') {
            out.push_str(&rest[..idx]);
            let tail = &rest[idx..];

            if let Some(after) = tail.strip_prefix("$${") {
                out.push_str("${");
                rest = after;
            } else if let Some(after) = tail.strip_prefix("${") {
                let end = after.find('}').ok_or_else(|| LoadError::UnterminatedInterpolation {
                    text: text.to_string(),
                })?;
                let name = after[..end].trim();
                let value = self.get(name).ok_or_else(|| LoadError::MissingContext {
                    name: name.to_string(),
                })?;
                out.push_str(value);
                rest = &after[end + 1..];
            } else {
                out.push('$');
                rest = &tail[1..];
            }
        }

        out.push_str(rest);
        Ok(out)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SharedContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ctx = SharedContext::new();
        for (k, v) in iter {
            ctx.insert(k, v);
        }
        ctx
    }
}

/// One fixture case
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    /// Optional label for reports
    pub name: Option<String>,
    /// Query template, may contain `::name` placeholders
    pub query: String,
    pub params: Option<BTreeMap<String, String>>,
    pub expect: ExpectedResult,
    /// Extra attempts after a protocol error or timeout; only for idempotent
    /// commands
    pub retries: u32,
    /// Only check the result shape, not its contents
    pub skip_result_check: bool,
}

impl TestCase {
    pub fn new(query: impl Into<String>, expect: ExpectedResult) -> Self {
        Self {
            name: None,
            query: query.into(),
            params: None,
            expect,
            retries: 0,
            skip_result_check: false,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Label used in logs and reports
    pub fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) => format!("#{} {}", index, name),
            None => format!("#{}", index),
        }
    }
}

/// A named, ordered fixture sequence
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureSuite {
    pub name: String,
    pub isolation: Isolation,
    pub cases: Vec<TestCase>,
    /// Source file, when loaded from disk
    pub source: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSuite {
    name: String,
    isolation: Isolation,
    cases: Vec<RawCase>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCase {
    #[serde(default)]
    name: Option<String>,
    query: String,
    #[serde(default)]
    params: Option<BTreeMap<String, Value>>,
    expect: QueryResult,
    #[serde(default)]
    retries: u32,
    #[serde(default)]
    skip_result_check: bool,
}

/// Render a YAML parameter value as a literal SQL fragment
fn param_text(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

impl FixtureSuite {
    /// Build a suite in code
    pub fn new(name: impl Into<String>, isolation: Isolation, cases: Vec<TestCase>) -> Self {
        Self {
            name: name.into(),
            isolation,
            cases,
            source: None,
        }
    }

    /// Parse a suite from YAML, injecting `ctx`
    pub fn from_yaml(yaml: &str, ctx: &SharedContext) -> Result<Self, LoadError> {
        let raw: RawSuite =
            serde_yaml::from_str(yaml).map_err(|source| LoadError::Yaml { path: None, source })?;
        Self::from_raw(raw, ctx)
    }

    /// Parse a suite from a YAML file, injecting `ctx`
    pub fn from_file(path: impl AsRef<Path>, ctx: &SharedContext) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawSuite = serde_yaml::from_str(&yaml).map_err(|source| LoadError::Yaml {
            path: Some(path.to_path_buf()),
            source,
        })?;
        let mut suite = Self::from_raw(raw, ctx)?;
        suite.source = Some(path.to_path_buf());
        Ok(suite)
    }

    /// Load every `*.yaml` / `*.yml` file in `dir`, ordered by file name
    pub fn load_dir(dir: impl AsRef<Path>, ctx: &SharedContext) -> Result<Vec<Self>, LoadError> {
        let dir = dir.as_ref();
        let io_err = |source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if is_yaml && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        files.iter().map(|p| Self::from_file(p, ctx)).collect()
    }

    /// Load a file, or every suite in a directory
    pub fn load_path(path: impl AsRef<Path>, ctx: &SharedContext) -> Result<Vec<Self>, LoadError> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::load_dir(path, ctx)
        } else {
            Ok(vec![Self::from_file(path, ctx)?])
        }
    }

    fn from_raw(raw: RawSuite, ctx: &SharedContext) -> Result<Self, LoadError> {
        let suite_name = ctx.interpolate(&raw.name)?;
        let mut cases = Vec::with_capacity(raw.cases.len());

        for (index, case) in raw.cases.into_iter().enumerate() {
            let params = match case.params {
                Some(params) => {
                    let mut resolved = BTreeMap::new();
                    for (key, value) in params {
                        if !placeholder::is_valid_name(&key) {
                            return Err(LoadError::InvalidSuite {
                                suite: suite_name,
                                message: format!("case #{}: '{}' is not a valid parameter name", index, key),
                            });
                        }
                        resolved.insert(key, ctx.interpolate(&param_text(&value))?);
                    }
                    Some(resolved)
                }
                None => None,
            };

            cases.push(TestCase {
                name: case.name.map(|n| ctx.interpolate(&n)).transpose()?,
                query: ctx.interpolate(&case.query)?,
                params,
                expect: interpolate_result(case.expect, ctx, &suite_name, index)?,
                retries: case.retries,
                skip_result_check: case.skip_result_check,
            });
        }

        Ok(Self {
            name: suite_name,
            isolation: raw.isolation,
            cases,
            source: None,
        })
    }
}

fn interpolate_result(
    result: QueryResult,
    ctx: &SharedContext,
    suite: &str,
    index: usize,
) -> Result<QueryResult, LoadError> {
    match result {
        QueryResult::Status(mut status) => {
            status.info = ctx.interpolate(&status.info)?;
            Ok(QueryResult::Status(status))
        }
        QueryResult::Rows(rows) => {
            let rows = rows
                .into_iter()
                .map(|row| interpolate_row(row, ctx, suite, index))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(QueryResult::Rows(rows))
        }
    }
}

/// Two columns interpolating to the same name is an error
fn interpolate_row(row: Row, ctx: &SharedContext, suite: &str, index: usize) -> Result<Row, LoadError> {
    let mut out = Row::new();
    for (template, value) in row {
        let column = ctx.interpolate(&template)?;
        let value = match value {
            Value::Text(text) => Value::Text(ctx.interpolate(&text)?),
            other => other,
        };
        if out.contains_key(&column) {
            return Err(LoadError::InvalidSuite {
                suite: suite.to_string(),
                message: format!(
                    "case #{}: column '{}' from '{}' duplicates another column",
                    index, column, template
                ),
            });
        }
        out.insert(column, value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{StatusResult, row};

    const SUITE: &str = r#"
name: databases
isolation: shared
cases:
  - query: USE ::dbName
    params:
      dbName: "${dbName}/main"
    expect:
      status: { fieldCount: 0, affectedRows: 0, insertId: 0, info: "", serverStatus: 2, warningStatus: 0 }
  - query: SHOW DATABASES
    expect:
      rows:
        - { Database: information_schema }
        - { Database: "${dbName}" }
  - name: create
    query: CREATE DATABASE ::dbName
    params: { dbName: new_db }
    retries: 0
    expect:
      status: { fieldCount: 0, affectedRows: 1, insertId: 0, info: "", serverStatus: 2, warningStatus: 0 }
"#;

    fn ctx() -> SharedContext {
        SharedContext::new().with("dbName", "app")
    }

    #[test]
    fn test_load_preserves_order_and_injects_context() {
        let suite = FixtureSuite::from_yaml(SUITE, &ctx()).unwrap();
        assert_eq!(suite.name, "databases");
        assert_eq!(suite.isolation, Isolation::Shared);
        assert_eq!(
            suite.cases.iter().map(|c| c.query.as_str()).collect::<Vec<_>>(),
            vec!["USE ::dbName", "SHOW DATABASES", "CREATE DATABASE ::dbName"]
        );
        assert_eq!(suite.cases[0].params.as_ref().unwrap()["dbName"], "app/main");
        assert_eq!(
            suite.cases[1].expect,
            QueryResult::Rows(vec![
                row([("Database", "information_schema")]),
                row([("Database", "app")]),
            ])
        );
        assert_eq!(suite.cases[2].expect, QueryResult::Status(StatusResult::ok(1)));
        assert_eq!(suite.cases[2].label(2), "#2 create");
    }

    #[test]
    fn test_missing_context_is_error() {
        let err = FixtureSuite::from_yaml(SUITE, &SharedContext::new()).unwrap_err();
        assert!(matches!(err, LoadError::MissingContext { ref name } if name == "dbName"));
    }

    #[test]
    fn test_isolation_is_required() {
        let yaml = "name: x\ncases: []\n";
        let err = FixtureSuite::from_yaml(yaml, &ctx()).unwrap_err();
        assert!(err.to_string().contains("isolation"));
    }

    #[test]
    fn test_numeric_param_rendered_literally() {
        let yaml = r#"
name: t
isolation: isolated
cases:
  - query: SELECT ::n
    params: { n: 42 }
    expect: { rows: [ { n: 42 } ] }
"#;
        let suite = FixtureSuite::from_yaml(yaml, &ctx()).unwrap();
        assert_eq!(suite.cases[0].params.as_ref().unwrap()["n"], "42");
    }

    #[test]
    fn test_invalid_param_name_rejected() {
        let yaml = r#"
name: t
isolation: isolated
cases:
  - query: SELECT 1
    params: { "bad-name": 1 }
    expect: { rows: [] }
"#;
        let err = FixtureSuite::from_yaml(yaml, &ctx()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidSuite { .. }));
    }

    #[test]
    fn test_duplicate_interpolated_columns_rejected() {
        let yaml = r#"
name: dup
isolation: isolated
cases:
  - query: SELECT 1
    expect: { rows: [] }
  - query: SELECT 'x', 'y'
    expect:
      rows:
        - { "${a}": x, "${b}": y }
"#;
        let c = SharedContext::new().with("a", "c").with("b", "c");
        let err = FixtureSuite::from_yaml(yaml, &c).unwrap_err();
        match err {
            LoadError::InvalidSuite { suite, message } => {
                assert_eq!(suite, "dup");
                assert!(message.starts_with("case #1:"), "{}", message);
                assert!(message.contains("'c'"), "{}", message);
            }
            other => panic!("expected InvalidSuite, got {:?}", other),
        }

        let c = SharedContext::new().with("a", "c").with("b", "d");
        let suite = FixtureSuite::from_yaml(yaml, &c).unwrap();
        assert_eq!(
            suite.cases[1].expect,
            QueryResult::Rows(vec![row([("c", "x"), ("d", "y")])])
        );
    }

    #[test]
    fn test_interpolation_escapes_and_errors() {
        let c = ctx();
        assert_eq!(c.interpolate("cost $5 ${dbName}").unwrap(), "cost $5 app");
        assert_eq!(c.interpolate("$${dbName}").unwrap(), "${dbName}");
        assert!(matches!(
            c.interpolate("${dbName"),
            Err(LoadError::UnterminatedInterpolation { .. })
        ));
    }

    #[test]
    fn test_load_dir_sorted_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let body = |name: &str| format!("name: {}\nisolation: isolated\ncases: []\n", name);
        std::fs::write(dir.path().join("b.yaml"), body("second")).unwrap();
        std::fs::write(dir.path().join("a.yml"), body("first")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let suites = FixtureSuite::load_dir(dir.path(), &ctx()).unwrap();
        let names: Vec<_> = suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(suites[0].source.as_ref().unwrap().ends_with("a.yml"));
    }
}
