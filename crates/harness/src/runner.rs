// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Fixture sequence runner
//!
//! Executes one [`FixtureSuite`] strictly in order on a single session:
//!
//! ```text
//! Idle -> Connecting -> Executing(i) -> Comparing(i) -> Executing(i+1) | Failed | Done
//! ```
//!
//! - A connection failure is fatal: the report gets a single
//!   `ConnectionError` entry for case 0 and nothing else runs.
//! - A dropped connection mid-sequence fails that case and aborts the rest,
//!   whatever the failure policy.
//! - Other failures stop the run under [`FailurePolicy::FailFast`] and are
//!   collected under [`FailurePolicy::CollectAll`].
//! - The session is closed on every exit path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::compare::{Verdict, compare, compare_shape};
use crate::db::{Connector, Session};
use crate::debug_log;
use crate::error::CaseFailure;
use crate::fixture::{FixtureSuite, TestCase};
use crate::placeholder;
use crate::report::{CaseReport, CaseVerdict, SuiteOutcome, SuiteReport};
use crate::result::ActualResult;

/// What to do after a case fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failing case
    #[default]
    FailFast,
    /// Run every case and report all failures
    CollectAll,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailFast => write!(f, "fail-fast"),
            FailurePolicy::CollectAll => write!(f, "collect-all"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "fail-fast" => Ok(FailurePolicy::FailFast),
            "collect-all" => Ok(FailurePolicy::CollectAll),
            other => Err(format!(
                "unknown failure policy '{}', expected fail-fast or collect-all",
                other
            )),
        }
    }
}

/// Runner settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Deadline for connecting and for each statement
    pub query_timeout: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(30),
            failure_policy: FailurePolicy::FailFast,
        }
    }
}

/// Runner state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Connecting,
    Executing(usize),
    Comparing(usize),
    Done,
    Failed,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerState::Idle => write!(f, "idle"),
            RunnerState::Connecting => write!(f, "connecting"),
            RunnerState::Executing(i) => write!(f, "executing({})", i),
            RunnerState::Comparing(i) => write!(f, "comparing({})", i),
            RunnerState::Done => write!(f, "done"),
            RunnerState::Failed => write!(f, "failed"),
        }
    }
}

/// Runs fixture sequences against sessions from a [`Connector`]
pub struct TestRunner {
    connector: Arc<dyn Connector>,
    options: RunnerOptions,
    state: RunnerState,
    /// Every state entered during the last run, in order
    history: Vec<RunnerState>,
}

impl TestRunner {
    pub fn new(connector: Arc<dyn Connector>, options: RunnerOptions) -> Self {
        Self {
            connector,
            options,
            state: RunnerState::Idle,
            history: vec![RunnerState::Idle],
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn history(&self) -> &[RunnerState] {
        &self.history
    }

    fn transition(&mut self, suite: &str, next: RunnerState) {
        debug!(suite, from = %self.state, to = %next, "Runner state change");
        self.state = next;
        self.history.push(next);
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.options.query_timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Run every case of `suite` on one fresh session
    pub async fn run(&mut self, suite: &FixtureSuite) -> SuiteReport {
        self.state = RunnerState::Idle;
        self.history = vec![RunnerState::Idle];

        info!(
            suite = %suite.name,
            cases = suite.cases.len(),
            policy = %self.options.failure_policy,
            server = %self.connector.describe(),
            "Running fixture suite"
        );
        debug_log!("=== suite {} ({} cases) ===", suite.name, suite.cases.len());

        let mut report = SuiteReport::new(&suite.name);

        self.transition(&suite.name, RunnerState::Connecting);
        let mut session = match self.connect().await {
            Ok(session) => session,
            Err(failure) => {
                error!(suite = %suite.name, error = %failure, "Could not open session");
                debug_log!("suite {}: {}", suite.name, failure);
                if let Some(first) = suite.cases.first() {
                    let query = placeholder::resolve(&first.query, first.params.as_ref())
                        .unwrap_or_else(|_| first.query.clone());
                    report.push(CaseReport::new(0, first, query, CaseVerdict::Fail(failure.clone())));
                }
                report.finish(SuiteOutcome::Failed, Some(failure));
                self.transition(&suite.name, RunnerState::Failed);
                return report;
            }
        };

        let fatal = self.run_cases(suite, session.as_mut(), &mut report).await;

        if let Err(e) = session.close().await {
            warn!(suite = %suite.name, error = %e, "Failed to close session");
        }

        let outcome = if report.failed_count() == 0 {
            SuiteOutcome::Done
        } else {
            SuiteOutcome::Failed
        };
        report.finish(outcome, fatal);
        let terminal = if outcome == SuiteOutcome::Done {
            RunnerState::Done
        } else {
            RunnerState::Failed
        };
        self.transition(&suite.name, terminal);

        info!(
            suite = %suite.name,
            passed = report.passed_count(),
            failed = report.failed_count(),
            "Fixture suite finished"
        );
        report
    }

    async fn connect(&self) -> Result<Box<dyn Session>, CaseFailure> {
        match tokio::time::timeout(self.options.query_timeout, self.connector.connect()).await {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(e)) => Err(CaseFailure::Connection { message: e.to_string() }),
            Err(_) => Err(CaseFailure::Connection {
                message: format!("no connection within {}ms", self.timeout_ms()),
            }),
        }
    }

    /// Returns the failure that aborted the sequence, if any
    async fn run_cases(
        &mut self,
        suite: &FixtureSuite,
        session: &mut dyn Session,
        report: &mut SuiteReport,
    ) -> Option<CaseFailure> {
        for (index, case) in suite.cases.iter().enumerate() {
            self.transition(&suite.name, RunnerState::Executing(index));
            let (query, attempts, verdict) = self.run_case(&suite.name, index, case, session).await;

            let failure = match &verdict {
                CaseVerdict::Pass => None,
                CaseVerdict::Fail(f) => Some(f.clone()),
            };
            report.push(CaseReport::new(index, case, query, verdict).with_attempts(attempts));

            if let Some(failure) = failure {
                warn!(
                    suite = %suite.name,
                    case = %case.label(index),
                    kind = failure.kind(),
                    "Case failed"
                );
                if failure.is_fatal() {
                    return Some(failure);
                }
                if self.options.failure_policy == FailurePolicy::FailFast {
                    return None;
                }
            }
        }
        None
    }

    async fn run_case(
        &mut self,
        suite: &str,
        index: usize,
        case: &TestCase,
        session: &mut dyn Session,
    ) -> (String, u32, CaseVerdict) {
        let query = match placeholder::resolve(&case.query, case.params.as_ref()) {
            Ok(query) => query,
            Err(e) => return (case.query.clone(), 0, CaseVerdict::Fail(e.into())),
        };
        debug_log!("suite {} case {}: {}", suite, case.label(index), query);

        let (attempts, actual) = self.execute(suite, index, case, &query, session).await;
        let actual = match actual {
            Ok(actual) => actual,
            Err(failure) => {
                debug_log!("suite {} case {}: {}", suite, case.label(index), failure);
                return (query, attempts, CaseVerdict::Fail(failure));
            }
        };

        self.transition(suite, RunnerState::Comparing(index));
        let verdict = if case.skip_result_check {
            compare_shape(&case.expect, &actual)
        } else {
            compare(&case.expect, &actual)
        };

        match verdict {
            Verdict::Pass => (query, attempts, CaseVerdict::Pass),
            Verdict::Fail(diff) => {
                debug_log!(
                    "suite {} case {}: expected {:?}, received {:?}",
                    suite,
                    case.label(index),
                    case.expect,
                    actual
                );
                (query, attempts, CaseVerdict::Fail(CaseFailure::Assertion { diff }))
            }
        }
    }

    /// Execute with the per-query deadline, retrying only when the case
    /// opts in
    async fn execute(
        &self,
        suite: &str,
        index: usize,
        case: &TestCase,
        query: &str,
        session: &mut dyn Session,
    ) -> (u32, Result<ActualResult, CaseFailure>) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let failure = match tokio::time::timeout(self.options.query_timeout, session.execute(query)).await {
                Ok(Ok(actual)) => return (attempts, Ok(actual)),
                Ok(Err(e)) if e.is_fatal() => return (attempts, Err(e.into())),
                Ok(Err(e)) => CaseFailure::from(e),
                Err(_) => CaseFailure::Timeout {
                    timeout_ms: self.timeout_ms(),
                },
            };

            if attempts > case.retries {
                return (attempts, Err(failure));
            }
            warn!(
                suite,
                case = %case.label(index),
                attempt = attempts,
                error = %failure,
                "Retrying case"
            );
        }
    }
}
