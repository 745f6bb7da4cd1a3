// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Recurring health-check loop.
//!
//! Each tick lists every `Postgres`, evaluates all of them concurrently (one task
//! per instance) and waits for every evaluation to finish. Only then does the
//! scheduler sleep for the configured interval, so ticks never overlap.
//!
//! The loop stops when the stop signal flips. An in-flight tick is drained first;
//! each probe is bounded by its own timeout.

use super::evaluator::{HealthEvaluator, HealthReport};
use crate::metrics::record_health_tick;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct HealthScheduler {
    evaluator: Arc<HealthEvaluator>,
    interval: Duration,
}

impl HealthScheduler {
    #[must_use]
    pub fn new(evaluator: Arc<HealthEvaluator>, interval: Duration) -> Self {
        Self {
            evaluator,
            interval,
        }
    }

    /// Run ticks until `stop` becomes `true` or its sender is dropped.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "Starting database health checker");

        loop {
            if *stop.borrow() {
                break;
            }

            let started = Instant::now();
            let reports = self.tick().await;
            record_health_tick(started.elapsed());
            debug!(instances = reports.len(), elapsed = ?started.elapsed(), "Health check tick finished");

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Database health checker stopped");
    }

    /// Evaluate every instance once and wait for all evaluations.
    pub async fn tick(&self) -> Vec<HealthReport> {
        let instances = match self.evaluator.store().list_postgres().await {
            Ok(instances) => instances,
            Err(e) => {
                warn!(error = %e, "Failed to list Postgres instances for health check");
                return Vec::new();
            }
        };

        let mut tasks = JoinSet::new();
        for pg in instances {
            let evaluator = self.evaluator.clone();
            tasks.spawn(async move { evaluator.evaluate(&pg).await });
        }

        let mut reports = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => warn!(error = %e, "Health check task failed"),
            }
        }
        reports
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod scheduler_tests;
