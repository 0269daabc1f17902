//! Retry decisions for failed publishes.
//!
//! Backoff is tracked per build type rather than per task: the first
//! retryable failure for a build type starts a clock, and retries stop once
//! either the next delay or the time since that first failure exceeds its
//! ceiling. A successful publish for the build type resets the clock.
//!
//! Delays double on every retry (`d0, 2·d0, 4·d0, ...`) without jitter. The
//! previous delay travels with the task, so the policy itself keeps no
//! per-task state.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::config::{RetryConfig, duration_millis};
use crate::publisher::PublisherError;
use crate::types::{BuildTypeId, Event};

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryInfo {
    pub should_retry: bool,
    /// Human-readable explanation, appended to the reported problem.
    pub message: String,
    /// Delay to attach to the resubmitted task. Zero when not retrying.
    pub new_delay: Duration,
}

impl RetryInfo {
    pub fn no_retry() -> Self {
        RetryInfo {
            should_retry: false,
            message: String::new(),
            new_delay: Duration::ZERO,
        }
    }

    fn refused(message: &str) -> Self {
        RetryInfo {
            should_retry: false,
            message: message.to_string(),
            new_delay: Duration::ZERO,
        }
    }

    fn retry_in(delay: Duration) -> Self {
        RetryInfo {
            should_retry: true,
            message: format!("Will retry in {} seconds", delay.as_secs()),
            new_delay: delay,
        }
    }
}

/// Decides whether a failed publish is retried, and after how long.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    /// First retryable failure per build type, in epoch milliseconds.
    first_failures: Mutex<HashMap<BuildTypeId, i64>>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        RetryPolicy {
            config,
            first_failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn first_failures(&self) -> MutexGuard<'_, HashMap<BuildTypeId, i64>> {
        self.first_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Evaluates a publish failure.
    ///
    /// `last_delay` is the delay the failed task was scheduled with, if it
    /// was itself a retry.
    pub fn evaluate(
        &self,
        error: &PublisherError,
        build_type: &BuildTypeId,
        event: Event,
        last_delay: Option<Duration>,
        now: DateTime<Utc>,
    ) -> RetryInfo {
        if !self.config.enabled || !event.is_retryable() || !error.is_retryable() {
            return RetryInfo::no_retry();
        }

        let now_ms = now.timestamp_millis();
        {
            let mut first_failures = self.first_failures();
            match first_failures.get(build_type) {
                Some(&first) => {
                    let elapsed = u64::try_from(now_ms.saturating_sub(first)).unwrap_or(0);
                    if elapsed > duration_millis(self.config.max_duration) {
                        return RetryInfo::refused(
                            "Retry will not be attempted, because problem occurs for too long",
                        );
                    }
                }
                None => {
                    first_failures.insert(build_type.clone(), now_ms);
                }
            }
        }

        let new_delay = match last_delay {
            Some(delay) => delay.saturating_mul(2),
            None => self.config.initial_delay,
        };
        if new_delay > self.config.max_delay {
            return RetryInfo::refused("Retry will not be attempted, because max retry delay is reached");
        }
        RetryInfo::retry_in(new_delay)
    }

    /// Forgets the failure clock of a build type after a successful publish.
    pub fn record_success(&self, build_type: &BuildTypeId) {
        self.first_failures().remove(build_type);
    }

    /// When the current failure streak of a build type started.
    pub fn first_failure_at(&self, build_type: &BuildTypeId) -> Option<DateTime<Utc>> {
        self.first_failures()
            .get(build_type)
            .and_then(|ms| DateTime::from_timestamp_millis(*ms))
    }

    /// Number of build types currently in a failure streak.
    pub fn failing_build_types(&self) -> usize {
        self.first_failures().len()
    }
}

// ─── Unit Tests ───
