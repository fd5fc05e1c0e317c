// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Run reports
//!
//! Every executed case contributes exactly one [`CaseReport`]; cases skipped
//! after a fail-fast stop or a fatal connection error contribute nothing.
//! [`RunReport`] aggregates suite reports in input order and renders either a
//! text summary (its `Display` impl) or JSON.

use serde::Serialize;
use std::fmt;

use crate::error::CaseFailure;
use crate::fixture::TestCase;

/// Verdict of a single case
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", content = "failure", rename_all = "snake_case")]
pub enum CaseVerdict {
    Pass,
    Fail(CaseFailure),
}

impl CaseVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, CaseVerdict::Pass)
    }

    pub fn failure(&self) -> Option<&CaseFailure> {
        match self {
            CaseVerdict::Pass => None,
            CaseVerdict::Fail(f) => Some(f),
        }
    }
}

/// Report entry for one executed case
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseReport {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Query as sent, or the template when resolution failed
    pub query: String,
    #[serde(flatten)]
    pub verdict: CaseVerdict,
    /// Execution attempts, 0 when nothing was sent
    pub attempts: u32,
}

impl CaseReport {
    pub fn new(index: usize, case: &TestCase, query: String, verdict: CaseVerdict) -> Self {
        Self {
            index,
            name: case.name.clone(),
            query,
            verdict,
            attempts: 1,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("#{} {}", self.index, name),
            None => format!("#{}", self.index),
        }
    }
}

/// Terminal state of a suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteOutcome {
    /// Still running, or never started
    Pending,
    Done,
    Failed,
}

/// Report for one fixture suite
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteReport {
    pub suite: String,
    pub outcome: SuiteOutcome,
    /// Failure that aborted the sequence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<CaseFailure>,
    /// Set when the suite task itself died
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub entries: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn new(suite: &str) -> Self {
        Self {
            suite: suite.to_string(),
            outcome: SuiteOutcome::Pending,
            fatal: None,
            aborted: None,
            entries: Vec::new(),
        }
    }

    /// Report for a suite whose task ended without producing a report
    pub fn aborted(suite: &str, message: impl Into<String>) -> Self {
        Self {
            outcome: SuiteOutcome::Failed,
            aborted: Some(message.into()),
            ..Self::new(suite)
        }
    }

    pub fn push(&mut self, entry: CaseReport) {
        self.entries.push(entry);
    }

    pub fn finish(&mut self, outcome: SuiteOutcome, fatal: Option<CaseFailure>) {
        self.outcome = outcome;
        self.fatal = fatal;
    }

    pub fn passed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.verdict.is_pass()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.entries.len() - self.passed_count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.entries.iter().filter(|e| !e.verdict.is_pass())
    }

    pub fn is_success(&self) -> bool {
        self.outcome == SuiteOutcome::Done
            && self.fatal.is_none()
            && self.aborted.is_none()
            && self.failed_count() == 0
    }
}

/// Reports for a whole run, in input order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub suites: Vec<SuiteReport>,
}

impl RunReport {
    pub fn new(suites: Vec<SuiteReport>) -> Self {
        Self { suites }
    }

    pub fn is_success(&self) -> bool {
        self.suites.iter().all(SuiteReport::is_success)
    }

    /// Process exit code: 0 only when every case passed
    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn case_count(&self) -> usize {
        self.suites.iter().map(|s| s.entries.len()).sum()
    }

    pub fn passed_count(&self) -> usize {
        self.suites.iter().map(SuiteReport::passed_count).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.suites.iter().map(SuiteReport::failed_count).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn write_indented(f: &mut fmt::Formatter<'_>, text: &str, indent: &str) -> fmt::Result {
    for line in text.lines() {
        writeln!(f, "{}{}", indent, line)?;
    }
    Ok(())
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for suite in &self.suites {
            let status = if suite.is_success() { "ok" } else { "FAILED" };
            writeln!(
                f,
                "suite {} ... {} ({} passed, {} failed)",
                suite.suite,
                status,
                suite.passed_count(),
                suite.failed_count()
            )?;

            if let Some(message) = &suite.aborted {
                writeln!(f, "  aborted: {}", message)?;
            }

            for entry in suite.failures() {
                let Some(failure) = entry.verdict.failure() else {
                    continue;
                };
                writeln!(f, "  case {} [{}]", entry.label(), failure.kind())?;
                writeln!(f, "    Query:    {}", entry.query)?;
                match failure {
                    CaseFailure::Assertion { diff } => {
                        writeln!(f, "    Expected / Received:")?;
                        write_indented(f, &diff.to_string(), "      ")?;
                    }
                    other => writeln!(f, "    Error:    {}", other)?,
                }
                if entry.attempts > 1 {
                    writeln!(f, "    Attempts: {}", entry.attempts)?;
                }
            }

            if let Some(fatal) = &suite.fatal {
                writeln!(f, "  aborted after fatal error: {}", fatal)?;
            }
        }

        write!(
            f,
            "\n{} suites, {} cases: {} passed, {} failed",
            self.suites.len(),
            self.case_count(),
            self.passed_count(),
            self.failed_count()
        )
    }
}
