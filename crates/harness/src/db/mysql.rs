// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # MySQL sessions
//!
//! [`Session`] implementation over a single `sqlx` MySQL connection.
//! Statements are sent as plain text queries (`COM_QUERY`) so commands such
//! as `USE` that cannot be prepared work unchanged.
//!
//! ## Status results
//!
//! `sqlx` surfaces affected rows and the last insert id of an OK packet but
//! not its status flags, warning count or info string. After a status
//! response the session issues
//! `SELECT @@warning_count, @@autocommit, @@in_transaction`, which leaves the
//! diagnostics area untouched, and rebuilds `warningStatus` plus the
//! autocommit and in-transaction bits of `serverStatus` from it. `info` is
//! always empty.
//!
//! ## Row sets
//!
//! Every cell is read from its text encoding and typed from the column
//! metadata: integer columns become [`Value::Int`], floating and decimal
//! columns [`Value::Float`], everything else [`Value::Text`].

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Either, Executor, Row as _, TypeInfo};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::db::adapter::{Connector, Session};
use crate::error::SessionError;
use crate::result::{
    ActualResult, QueryResult, Row, SERVER_STATUS_AUTOCOMMIT, SERVER_STATUS_IN_TRANS, StatusResult, Value,
};

/// Statement keywords that always answer with a result set
const ROW_RETURNING: &[&str] = &["SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "WITH", "VALUES", "TABLE"];

const STATUS_QUERY: &str = "SELECT @@warning_count, @@autocommit, @@in_transaction";

/// Opens [`MySqlSession`]s from a [`ConnectionConfig`]
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    config: ConnectionConfig,
}

impl MySqlConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    fn describe(&self) -> String {
        self.config.redacted_url()
    }

    async fn connect(&self) -> Result<Box<dyn Session>, SessionError> {
        info!(server = %self.describe(), "Opening MySQL session");
        let options = self
            .config
            .connect_options()
            .map_err(|e| SessionError::Connection(e.to_string()))?;
        let conn = options
            .connect()
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;
        Ok(Box::new(MySqlSession { conn: Some(conn) }))
    }
}

/// A single MySQL connection
pub struct MySqlSession {
    conn: Option<MySqlConnection>,
}

impl MySqlSession {
    fn conn(&mut self) -> Result<&mut MySqlConnection, SessionError> {
        self.conn
            .as_mut()
            .ok_or_else(|| SessionError::Disconnected("session already closed".to_string()))
    }
}

#[async_trait]
impl Session for MySqlSession {
    async fn execute(&mut self, sql: &str) -> Result<ActualResult, SessionError> {
        let conn = self.conn()?;
        debug!(sql, "Executing statement");

        let mut rows = Vec::new();
        let mut affected_rows = 0;
        let mut insert_id = 0;
        {
            let mut stream = (&mut *conn).fetch_many(sql);
            while let Some(item) = stream.try_next().await.map_err(classify)? {
                match item {
                    Either::Left(done) => {
                        affected_rows += done.rows_affected();
                        insert_id = done.last_insert_id();
                    }
                    Either::Right(row) => rows.push(convert_row(&row)?),
                }
            }
        }

        if !rows.is_empty() || returns_rows(sql) {
            return Ok(QueryResult::Rows(rows));
        }

        let status = read_session_status(conn).await?;
        Ok(QueryResult::Status(StatusResult {
            field_count: 0,
            affected_rows,
            insert_id,
            info: String::new(),
            server_status: status.server_status(),
            warning_status: status.warnings,
        }))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        match self.conn.take() {
            Some(conn) => conn.close().await.map_err(classify),
            None => Ok(()),
        }
    }
}

fn classify(err: sqlx::Error) -> SessionError {
    match err {
        sqlx::Error::Database(ref db) => SessionError::Protocol(match db.code() {
            Some(code) => format!("{} (code {})", db.message(), code),
            None => db.message().to_string(),
        }),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut => SessionError::Disconnected(err.to_string()),
        other => SessionError::Protocol(other.to_string()),
    }
}

/// Whether `sql` starts with a keyword that always yields a result set
fn returns_rows(sql: &str) -> bool {
    let body = sql.trim_start().trim_start_matches('(').trim_start();
    let keyword: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    ROW_RETURNING.contains(&keyword.as_str())
}

fn text_cell(row: &MySqlRow, index: usize) -> Result<Option<String>, SessionError> {
    row.try_get_unchecked::<Option<String>, _>(index)
        .map_err(|e| SessionError::Protocol(format!("cannot decode column {}: {}", index, e)))
}

fn convert_row(row: &MySqlRow) -> Result<Row, SessionError> {
    let mut out = Row::new();
    for column in row.columns() {
        let value = match text_cell(row, column.ordinal())? {
            Some(text) => typed_value(column.type_info().name(), text),
            None => Value::Null,
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn typed_value(type_name: &str, text: String) -> Value {
    let upper = type_name.to_ascii_uppercase();
    if upper.contains("INT") || upper == "BOOLEAN" || upper == "YEAR" {
        if let Ok(i) = text.parse::<i64>() {
            return Value::Int(i);
        }
    } else if matches!(upper.as_str(), "FLOAT" | "DOUBLE" | "DECIMAL") {
        if let Ok(f) = text.parse::<f64>() {
            return Value::Float(f);
        }
    }
    Value::Text(text)
}

/// Session state read back after a status response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionStatus {
    warnings: u16,
    autocommit: bool,
    in_transaction: bool,
}

impl SessionStatus {
    /// The `serverStatus` flags an OK packet would carry
    fn server_status(&self) -> u16 {
        let mut flags = 0;
        if self.in_transaction {
            flags |= SERVER_STATUS_IN_TRANS;
        }
        if self.autocommit {
            flags |= SERVER_STATUS_AUTOCOMMIT;
        }
        flags
    }
}

async fn read_session_status(conn: &mut MySqlConnection) -> Result<SessionStatus, SessionError> {
    let row = (&mut *conn).fetch_one(STATUS_QUERY).await.map_err(classify)?;

    let number = |index: usize| -> Result<u64, SessionError> {
        text_cell(&row, index)?
            .unwrap_or_default()
            .trim()
            .parse::<u64>()
            .map_err(|e| SessionError::Protocol(format!("unexpected session status value: {}", e)))
    };

    Ok(SessionStatus {
        warnings: u16::try_from(number(0)?).unwrap_or(u16::MAX),
        autocommit: number(1)? != 0,
        in_transaction: number(2)? != 0,
    })
}
