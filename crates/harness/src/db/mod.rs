// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Sessions against the system under test

pub mod adapter;
pub mod mysql;

pub use adapter::{Connector, Session};
pub use mysql::{MySqlConnector, MySqlSession};
