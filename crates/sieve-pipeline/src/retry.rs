//! Bounded retry with exponential backoff.
//!
//! Wraps any "send once" operation. Only errors the policy classifies as
//! transient are retried; the first terminal error is returned as-is.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};

use crate::error::{AttemptError, ConfigError};

/// Largest accepted growth factor between delays.
const MAX_BACKOFF_MULTIPLIER: f64 = 16.0;

/// Largest accepted single delay (one hour).
const MAX_BACKOFF_CEILING_MS: u64 = 3_600_000;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Factor applied to the delay for each further retry.
    pub backoff_multiplier: f64,
    /// Ceiling on a single delay.
    pub max_backoff_ms: u64,
    /// HTTP statuses treated as transient.
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10_000,
            retry_statuses: vec![500, 502, 503, 504],
        }
    }
}

/// Final failure of a retried operation.
#[derive(Debug)]
pub struct RetryFailure {
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Error from the last attempt.
    pub error: AttemptError,
    /// True if the last error was transient and the budget ran out.
    pub exhausted: bool,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Returns a copy with a different initial delay.
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff_ms = delay.as_millis() as u64;
        self
    }

    /// Returns true if the error should be retried.
    pub fn is_transient(&self, err: &AttemptError) -> bool {
        match err {
            AttemptError::Status { status, .. } => self.retry_statuses.contains(status),
            AttemptError::Timeout | AttemptError::Transport(_) => true,
            AttemptError::Decode(_) => false,
        }
    }

    /// Checks values the backoff schedule cannot represent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.backoff_multiplier.is_finite()
            && (1.0..=MAX_BACKOFF_MULTIPLIER).contains(&self.backoff_multiplier))
        {
            return Err(ConfigError::InvalidRetry(format!(
                "backoff multiplier must be between 1 and {MAX_BACKOFF_MULTIPLIER}, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_backoff_ms > MAX_BACKOFF_CEILING_MS {
            return Err(ConfigError::InvalidRetry(format!(
                "max backoff must be at most {MAX_BACKOFF_CEILING_MS} ms, got {}",
                self.max_backoff_ms
            )));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::InvalidRetry(format!(
                "initial backoff {} ms exceeds max backoff {} ms",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.initial_backoff_ms))
            .with_max_delay(Duration::from_millis(self.max_backoff_ms))
            .with_factor(self.backoff_multiplier as f32)
            .with_max_times(self.max_retries as usize)
    }

    /// Runs `op` until it succeeds, fails terminally, or the budget runs out.
    ///
    /// `op` receives the 1-indexed attempt number.
    pub async fn run<F, Fut, T>(&self, mut op: F) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let attempts = AtomicU32::new(0);

        let result = (|| op(attempts.fetch_add(1, Ordering::SeqCst) + 1))
            .retry(self.backoff())
            .when(|err: &AttemptError| self.is_transient(err))
            .notify(|err: &AttemptError, delay: Duration| {
                tracing::debug!(?delay, error = %err, "transient failure, retrying");
            })
            .await;

        result.map_err(|error| RetryFailure {
            attempts: attempts.load(Ordering::SeqCst),
            exhausted: self.is_transient(&error),
            error,
        })
    }
}
