// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry and polling primitives.
//!
//! Three shapes of waiting show up in the operator:
//!
//! - [`retry_api_call`]: exponential backoff around plain Kubernetes reads, retrying
//!   transient API errors (429, 5xx) and failing fast on client errors (4xx).
//! - [`update_with_retry`]: a fixed number of attempts with a fixed delay, used for
//!   status-only writes that may race with other writers.
//! - [`poll_until`]: re-evaluate a predicate on a fixed interval up to a ceiling, used
//!   for `StatefulSet` readiness and restore `Job` completion.
//!
//! All sleeping goes through `tokio::time`, so tests run these against a paused clock.

use anyhow::{anyhow, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Maximum total time to spend retrying an API call (5 minutes)
const MAX_ELAPSED_TIME_SECS: u64 = 300;

/// Initial retry interval (100ms)
const INITIAL_INTERVAL_MILLIS: u64 = 100;

/// Maximum interval between retries (30 seconds)
const MAX_INTERVAL_SECS: u64 = 30;

const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Jitter applied to each interval (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Exponential backoff with jitter and an elapsed-time ceiling.
pub struct ExponentialBackoff {
    pub current_interval: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed_time: Option<Duration>,
    pub multiplier: f64,
    pub randomization_factor: f64,
    start_time: Instant,
}

impl ExponentialBackoff {
    fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            max_elapsed_time,
            multiplier,
            randomization_factor,
            start_time: Instant::now(),
        }
    }

    /// Next interval to wait, or `None` once the elapsed-time ceiling is reached.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.max_elapsed_time {
            if self.start_time.elapsed() >= max_elapsed {
                return None;
            }
        }

        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        Some(jittered)
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let min = secs - delta;
        let max = secs + delta;

        let jittered = rand::rng().random_range(min..=max);

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Backoff used for Kubernetes API reads.
#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(INITIAL_INTERVAL_MILLIS),
        Duration::from_secs(MAX_INTERVAL_SECS),
        Some(Duration::from_secs(MAX_ELAPSED_TIME_SECS)),
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Retry a Kubernetes API call with exponential backoff.
///
/// # Arguments
///
/// * `operation` - Closure producing the API call future; invoked once per attempt
/// * `operation_name` - Name used in logs
///
/// # Errors
///
/// Returns the first non-retryable error, or an error once the backoff is exhausted.
pub async fn retry_api_call<T, F, Fut>(mut operation: F, operation_name: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = default_backoff();
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        "Kubernetes API call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                if !is_retryable_error(&e) {
                    debug!(
                        operation = operation_name,
                        error = %e,
                        "Non-retryable Kubernetes API error, failing immediately"
                    );
                    return Err(e.into());
                }

                if let Some(duration) = backoff.next_backoff() {
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        retry_after = ?duration,
                        error = %e,
                        "Retryable Kubernetes API error, will retry"
                    );
                    tokio::time::sleep(duration).await;
                } else {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        error = %e,
                        "Backoff exhausted, giving up"
                    );
                    return Err(anyhow!("Backoff exhausted after {attempt} attempts: {e}"));
                }
            }
        }
    }
}

/// Whether a Kubernetes API error is worth retrying.
#[must_use]
pub fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(api_err) => {
            api_err.code == 429 || (api_err.code >= 500 && api_err.code < 600)
        }
        kube::Error::Service(_) => true,
        _ => false,
    }
}

/// Whether a Kubernetes API error is a 404.
#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 404)
}

/// Run `operation` up to `attempts` times, sleeping `delay` between failures.
///
/// The closure receives the 1-based attempt number. Each attempt is expected to
/// re-read the object it writes so a conflict on one attempt is resolved on the next.
///
/// # Errors
///
/// Returns the last error, wrapped with the attempt count, once all attempts fail.
pub async fn update_with_retry<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                return Err(e.context(format!(
                    "Failed to update {operation_name} after {attempts} attempts"
                )));
            }
            Err(e) => {
                debug!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %e,
                    "Update attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Interval and ceiling for [`poll_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Evaluate `predicate` every `config.interval` until it returns `true`.
///
/// The predicate runs immediately, then after each interval. An error from the
/// predicate ends the wait at once.
///
/// # Errors
///
/// Returns the predicate's error, or a timeout error once `config.timeout` has elapsed
/// without the predicate being satisfied.
pub async fn poll_until<F, Fut>(config: PollConfig, operation_name: &str, mut predicate: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + config.timeout;
    let mut polls = 0u32;

    loop {
        polls += 1;
        if predicate().await? {
            debug!(operation = operation_name, polls = polls, "Poll condition satisfied");
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(anyhow!(
                "timed out after {:?} waiting for {operation_name}",
                config.timeout
            ));
        }

        let remaining = deadline - now;
        tokio::time::sleep(config.interval.min(remaining)).await;
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
