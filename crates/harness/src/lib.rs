// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # SQL Fixture Harness
//!
//! Declarative request/response verification for MySQL-protocol servers.
//! A fixture suite is an ordered list of cases; each case is a query template
//! with `::name` placeholders, optional parameters and the expected result
//! (an OK-packet status or a list of rows). The runner executes a suite on one
//! session, compares every response structurally and records a verdict per
//! case.
//!
//! ## Features
//!
//! - YAML fixtures with `${key}` values injected from a shared context
//! - Strictly ordered execution per suite, fail-fast or collect-all
//! - Per-query timeouts and opt-in retries for idempotent commands
//! - Concurrent execution of suites declared `isolated`
//! - Text and JSON reports
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sql_fixture_harness::{HarnessConfig, run_paths};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = HarnessConfig::default();
//!     config.connection.database = Some("app".into());
//!     let report = run_paths(&config, &["fixtures".into()]).await?;
//!     println!("{}", report);
//!     std::process::exit(report.exit_code().into());
//! }
//! ```

pub mod compare;
pub mod config;
pub mod db;
pub mod error;
pub mod fixture;
pub mod logging;
pub mod placeholder;
pub mod report;
pub mod result;
pub mod runner;
pub mod scheduler;

pub use compare::{Diff, Verdict, compare};
pub use config::{ConnectionConfig, HarnessConfig};
pub use db::{Connector, MySqlConnector, Session};
pub use error::{CaseFailure, ConfigError, LoadError, PlaceholderError, SessionError};
pub use fixture::{FixtureSuite, Isolation, SharedContext, TestCase};
pub use report::{CaseReport, CaseVerdict, RunReport, SuiteOutcome, SuiteReport};
pub use result::{ActualResult, ExpectedResult, QueryResult, Row, StatusResult, Value};
pub use runner::{FailurePolicy, RunnerOptions, RunnerState, TestRunner};
pub use scheduler::Scheduler;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Load every suite under `paths`, in the order given
pub fn load_suites(paths: &[PathBuf], ctx: &SharedContext) -> Result<Vec<FixtureSuite>> {
    let mut suites = Vec::new();
    for path in paths {
        let loaded = FixtureSuite::load_path(path, ctx)
            .with_context(|| format!("Failed to load fixtures from {}", path.display()))?;
        suites.extend(loaded);
    }
    Ok(suites)
}

/// Load fixtures from `paths` and run them against the configured server
///
/// Case failures end up in the returned report; only configuration and load
/// errors are returned as `Err`.
pub async fn run_paths(config: &HarnessConfig, paths: &[PathBuf]) -> Result<RunReport> {
    config.validate()?;
    let suites = load_suites(paths, &config.shared_context())?;
    info!(suites = suites.len(), server = %config.connection.redacted_url(), "Loaded fixture suites");

    let connector: Arc<dyn Connector> = Arc::new(MySqlConnector::new(config.connection.clone()));
    let scheduler = Scheduler::new(connector, config.runner_options(), config.max_parallel_suites);
    let report = scheduler.run(suites).await;

    if !report.is_success() {
        if let Some(path) = logging::flush_to_file()? {
            info!(path = %path.display(), "Fixture failure log written");
        }
    }
    Ok(report)
}
