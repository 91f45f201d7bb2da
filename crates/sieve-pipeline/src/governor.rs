//! Request-rate governor shared by all workers.
//!
//! Grants are spaced at least `1 / max_per_second` apart. The last grant
//! instant sits behind an async mutex that is held across the wait, so two
//! grants can never land inside the same interval.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::ConfigError;

/// Spacing between grants for a rate, rejecting rates whose interval is not
/// a representable `Duration`.
pub fn interval_for(max_per_second: f64) -> Result<Duration, ConfigError> {
    if !(max_per_second.is_finite() && max_per_second > 0.0) {
        return Err(ConfigError::InvalidRate(max_per_second));
    }
    Duration::try_from_secs_f64(1.0 / max_per_second)
        .map_err(|_| ConfigError::InvalidRate(max_per_second))
}

/// Paces outgoing requests to a fixed maximum rate.
#[derive(Debug)]
pub struct RateGovernor {
    interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateGovernor {
    /// Creates a governor allowing at most `max_per_second` grants per second.
    pub fn new(max_per_second: f64) -> Result<Self, ConfigError> {
        Ok(Self::with_interval(interval_for(max_per_second)?))
    }

    /// Creates a governor with an explicit minimum spacing between grants.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_grant: Mutex::new(None),
        }
    }

    /// Minimum spacing between grants.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the interval since the previous grant has elapsed, then
    /// grants. Returns the grant instant.
    pub async fn acquire(&self) -> Instant {
        let mut last = self.last_grant.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        let granted = Instant::now();
        *last = Some(granted);
        granted
    }
}
