//! Retry policy and activity options applied to every activity invocation.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ActivityError, SagaError};

/// Exponential backoff policy for retryable activity failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    /// Total attempts allowed, `None` retries until success.
    pub maximum_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(30),
            maximum_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Limits the total number of attempts.
    pub fn with_maximum_attempts(mut self, attempts: u32) -> Self {
        self.maximum_attempts = Some(attempts);
        self
    }

    /// Returns the delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let millis = self.initial_interval.as_millis() as f64 * self.backoff_coefficient.powi(exponent);
        let capped = millis.min(self.maximum_interval.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Returns true if another attempt may follow `attempt`.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        self.maximum_attempts.is_none_or(|max| attempt < max)
    }
}

/// Options for a single activity invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityOptions {
    /// Deadline for one attempt; exceeding it counts as a retryable failure.
    pub start_to_close_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self::forward()
    }
}

impl ActivityOptions {
    /// Options for forward saga steps.
    pub fn forward() -> Self {
        Self {
            start_to_close_timeout: Duration::from_secs(5),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Options for undo steps, with a longer timeout.
    pub fn compensation() -> Self {
        Self {
            start_to_close_timeout: Duration::from_secs(10),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Options for the item lookup, run as a local activity.
    pub fn local() -> Self {
        Self {
            start_to_close_timeout: Duration::from_secs(5),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }
}

/// Information about the current activity attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityInfo {
    pub workflow_id: String,
    pub activity_type: String,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// Runs an activity until it succeeds, fails non-retryably, or the policy gives up.
///
/// Each attempt is bounded by `start_to_close_timeout`. Retryable failures
/// sleep for the policy's backoff before the next attempt.
pub async fn execute_with_retry<T, F, Fut>(
    workflow_id: &str,
    activity: &str,
    options: &ActivityOptions,
    call: F,
) -> Result<T, SagaError>
where
    F: Fn(ActivityInfo) -> Fut,
    Fut: Future<Output = Result<T, ActivityError>>,
{
    let mut attempt = 1;
    loop {
        let info = ActivityInfo {
            workflow_id: workflow_id.to_string(),
            activity_type: activity.to_string(),
            attempt,
        };
        metrics::counter!("activity_attempts_total", "activity" => activity.to_string())
            .increment(1);

        let outcome = match tokio::time::timeout(options.start_to_close_timeout, call(info)).await
        {
            Ok(result) => result,
            Err(_) => Err(ActivityError::retryable(format!(
                "activity timed out after {:?}",
                options.start_to_close_timeout
            ))),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && options.retry_policy.allows_retry_after(attempt) => {
                let delay = options.retry_policy.backoff(attempt);
                tracing::warn!(
                    workflow_id,
                    activity,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "activity attempt failed, retrying"
                );
                metrics::counter!("activity_retries_total", "activity" => activity.to_string())
                    .increment(1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::warn!(workflow_id, activity, attempt, error = %err, "activity failed");
                return Err(SagaError::activity_failed(activity, attempt, err));
            }
        }
    }
}
