// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! In-memory MySQL stand-in for runner and scheduler tests
//!
//! Understands `USE <db>`, `SHOW DATABASES` and `CREATE DATABASE <db>`, plus a
//! few trigger statements:
//!
//! - `HANG`: never answers
//! - `FLAKY`: fails with a protocol error while `flaky_failures` is non-zero
//! - `DROP CONNECTION`: the session is lost
//! - `SLEEP`: answers after `latency`

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sql_fixture_harness::result::row;
use sql_fixture_harness::{ActualResult, Connector, QueryResult, Session, SessionError, StatusResult};

#[derive(Debug, Default)]
pub struct ServerState {
    /// In creation order, as `SHOW DATABASES` lists them
    pub databases: Vec<String>,
    pub executed: Vec<String>,
    pub connects: usize,
    pub closes: usize,
    pub open_sessions: usize,
    pub max_open_sessions: usize,
    pub flaky_failures: u32,
}

#[derive(Clone)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
    refuse_connections: bool,
    latency: Duration,
}

impl FakeServer {
    /// Fresh server holding the databases a branch-aware server reports for
    /// `app`
    pub fn new() -> Self {
        Self::with_databases(&["information_schema", "mysql", "app", "app/main"])
    }

    pub fn with_databases(databases: &[&str]) -> Self {
        let state = ServerState {
            databases: databases.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            refuse_connections: false,
            latency: Duration::ZERO,
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse_connections: true,
            ..Self::new()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_flaky_failures(self, failures: u32) -> Self {
        self.state().flaky_failures = failures;
        self
    }

    pub fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Connector for FakeServer {
    fn describe(&self) -> String {
        "fake://server".to_string()
    }

    async fn connect(&self) -> Result<Box<dyn Session>, SessionError> {
        if self.refuse_connections {
            return Err(SessionError::Connection("connection refused".to_string()));
        }
        let mut state = self.state();
        state.connects += 1;
        state.open_sessions += 1;
        state.max_open_sessions = state.max_open_sessions.max(state.open_sessions);
        Ok(Box::new(FakeSession {
            state: self.state.clone(),
            latency: self.latency,
            open: true,
        }))
    }
}

pub struct FakeSession {
    state: Arc<Mutex<ServerState>>,
    latency: Duration,
    open: bool,
}

fn ok(affected_rows: u64) -> ActualResult {
    QueryResult::Status(StatusResult::ok(affected_rows))
}

#[async_trait]
impl Session for FakeSession {
    async fn execute(&mut self, sql: &str) -> Result<ActualResult, SessionError> {
        if !self.open {
            return Err(SessionError::Disconnected("session closed".to_string()));
        }
        self.state.lock().unwrap().executed.push(sql.to_string());

        match sql {
            "HANG" => std::future::pending().await,
            "SLEEP" => {
                tokio::time::sleep(self.latency).await;
                return Ok(ok(0));
            }
            "DROP CONNECTION" => {
                self.open = false;
                return Err(SessionError::Disconnected("server went away".to_string()));
            }
            _ => {}
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state.lock().unwrap();
        if sql == "FLAKY" {
            if state.flaky_failures > 0 {
                state.flaky_failures -= 1;
                return Err(SessionError::Protocol("lock wait timeout exceeded".to_string()));
            }
            return Ok(ok(0));
        }
        if sql == "SHOW DATABASES" {
            return Ok(QueryResult::Rows(
                state.databases.iter().map(|d| row([("Database", d.as_str())])).collect(),
            ));
        }
        if let Some(db) = sql.strip_prefix("USE ") {
            return if state.databases.iter().any(|d| d == db) {
                Ok(ok(0))
            } else {
                Err(SessionError::Protocol(format!("Unknown database '{}'", db)))
            };
        }
        if let Some(db) = sql.strip_prefix("CREATE DATABASE ") {
            if state.databases.iter().any(|d| d == db) {
                return Err(SessionError::Protocol(format!(
                    "Can't create database '{}'; database exists",
                    db
                )));
            }
            state.databases.push(db.to_string());
            return Ok(ok(1));
        }
        Err(SessionError::Protocol(format!("You have an error in your SQL syntax near '{}'", sql)))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.open = false;
        let mut state = self.state.lock().unwrap();
        state.closes += 1;
        state.open_sessions = state.open_sessions.saturating_sub(1);
        Ok(())
    }
}
