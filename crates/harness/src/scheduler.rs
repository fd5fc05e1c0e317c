// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Suite scheduler
//!
//! Runs many suites. Suites declared [`Isolation::Isolated`] run concurrently,
//! each on its own session, with at most `max_parallel` in flight. Suites
//! declared [`Isolation::Shared`] touch server-global state and run one at a
//! time after every isolated suite has finished.
//!
//! The resulting [`RunReport`] lists suites in input order regardless of
//! completion order.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::db::Connector;
use crate::fixture::{FixtureSuite, Isolation};
use crate::report::{RunReport, SuiteReport};
use crate::runner::{RunnerOptions, TestRunner};

/// Runs fixture suites against one server
pub struct Scheduler {
    connector: Arc<dyn Connector>,
    options: RunnerOptions,
    max_parallel: usize,
}

impl Scheduler {
    pub fn new(connector: Arc<dyn Connector>, options: RunnerOptions, max_parallel: usize) -> Self {
        Self {
            connector,
            options,
            max_parallel: max_parallel.max(1),
        }
    }

    pub async fn run(&self, suites: Vec<FixtureSuite>) -> RunReport {
        let names: Vec<String> = suites.iter().map(|s| s.name.clone()).collect();
        let mut slots: Vec<Option<SuiteReport>> = vec![None; suites.len()];

        let (isolated, shared): (Vec<_>, Vec<_>) = suites
            .into_iter()
            .enumerate()
            .partition(|(_, s)| s.isolation == Isolation::Isolated);

        info!(
            isolated = isolated.len(),
            shared = shared.len(),
            max_parallel = self.max_parallel,
            "Scheduling fixture suites"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut join_set = JoinSet::new();

        for (index, suite) in isolated {
            let semaphore = semaphore.clone();
            let connector = self.connector.clone();
            let options = self.options;

            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return (index, SuiteReport::aborted(&suite.name, "scheduler shut down"));
                };
                let mut runner = TestRunner::new(connector, options);
                (index, runner.run(&suite).await)
            });
        }

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((index, report)) => slots[index] = Some(report),
                Err(join_error) => error!(error = %join_error, "Suite task failed"),
            }
        }

        for (index, suite) in shared {
            let mut runner = TestRunner::new(self.connector.clone(), self.options);
            slots[index] = Some(runner.run(&suite).await);
        }

        let reports = slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| {
                slot.unwrap_or_else(|| SuiteReport::aborted(&name, "suite task panicked"))
            })
            .collect();
        RunReport::new(reports)
    }
}
