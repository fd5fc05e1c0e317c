// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Session traits
//!
//! The server under test is reached through its standard client: a
//! [`Connector`] opens a [`Session`], the session executes raw statements and
//! is closed when the sequence ends.

use async_trait::async_trait;

use crate::error::SessionError;
use crate::result::ActualResult;

/// Opens sessions against the system under test
#[async_trait]
pub trait Connector: Send + Sync {
    /// Target description for logs (no credentials)
    fn describe(&self) -> String;

    /// Establish a new session
    async fn connect(&self) -> Result<Box<dyn Session>, SessionError>;
}

/// A single connection to the system under test
#[async_trait]
pub trait Session: Send {
    /// Execute one statement and return its result
    async fn execute(&mut self, sql: &str) -> Result<ActualResult, SessionError>;

    /// Close the session; later calls to `execute` fail with
    /// [`SessionError::Disconnected`]
    async fn close(&mut self) -> Result<(), SessionError>;
}
