// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Error types
//!
//! Load and configuration errors are returned to the caller. Case-level
//! failures are never returned as errors; they are captured into the report
//! as a [`CaseFailure`].

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::compare::Diff;

/// Placeholder resolution errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
    /// A `::name` placeholder has no bound value
    #[error("missing parameter '{0}'")]
    MissingParameter(String),
}

/// Errors reported by a [`Session`](crate::db::Session) or
/// [`Connector`](crate::db::Connector)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session could not be established
    #[error("failed to connect: {0}")]
    Connection(String),

    /// The session was lost mid-sequence
    #[error("connection lost: {0}")]
    Disconnected(String),

    /// The server answered with an error or a response the harness cannot
    /// interpret as a status result or row set
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SessionError {
    /// Whether the session is unusable after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Connection(_) | SessionError::Disconnected(_))
    }
}

/// Why a single fixture case failed
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaseFailure {
    #[error("missing parameter '{name}'")]
    MissingParameter { name: String },

    #[error("connection error: {message}")]
    Connection { message: String },

    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("assertion failure:\n{diff}")]
    Assertion { diff: Diff },

    #[error("no response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl CaseFailure {
    /// Short kind label used in summaries
    pub fn kind(&self) -> &'static str {
        match self {
            CaseFailure::MissingParameter { .. } => "MissingParameter",
            CaseFailure::Connection { .. } => "ConnectionError",
            CaseFailure::Protocol { .. } => "ProtocolError",
            CaseFailure::Assertion { .. } => "AssertionFailure",
            CaseFailure::Timeout { .. } => "Timeout",
        }
    }

    /// Connection failures abort the whole sequence
    pub fn is_fatal(&self) -> bool {
        matches!(self, CaseFailure::Connection { .. })
    }
}

impl From<PlaceholderError> for CaseFailure {
    fn from(err: PlaceholderError) -> Self {
        match err {
            PlaceholderError::MissingParameter(name) => CaseFailure::MissingParameter { name },
        }
    }
}

impl From<SessionError> for CaseFailure {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Connection(message) | SessionError::Disconnected(message) => {
                CaseFailure::Connection { message }
            }
            SessionError::Protocol(message) => CaseFailure::Protocol { message },
        }
    }
}

/// Errors while loading fixture suites
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid fixture YAML{}: {source}", location(.path))]
    Yaml {
        path: Option<PathBuf>,
        #[source]
        source: serde_yaml::Error,
    },

    /// `${name}` with no entry in the shared context
    #[error("shared context has no value for '${{{name}}}'")]
    MissingContext { name: String },

    #[error("unterminated '${{' in: {text}")]
    UnterminatedInterpolation { text: String },

    #[error("invalid suite '{suite}': {message}")]
    InvalidSuite { suite: String, message: String },
}

fn location(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" in {}", p.display()))
        .unwrap_or_default()
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
