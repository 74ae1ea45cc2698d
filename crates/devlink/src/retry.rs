//! Retry policy for commit attempts.
//!
//! Only RPC timeouts are retried (see [`crate::error::ErrorCategory`]). The
//! delay between attempts is a safety property, not a tuning knob: the device
//! arms its own rollback timer on a confirmed commit, and retrying before
//! that timer has expired races a half-applied configuration. The backoff
//! floor is therefore tied to the confirm window.

use std::time::Duration;

/// Extra slack added on top of the confirm window when deriving a backoff.
const ROLLBACK_GRACE: Duration = Duration::from_secs(30);

/// Configuration for the commit retry loop.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Base delay between attempts.
    ///
    /// Must exceed the device's confirm timeout: the previous attempt's
    /// rollback timer has to fire before the next attempt re-stages.
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(150),
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(600),
        }
    }
}

impl RetryConfig {
    /// Derive a config whose backoff safely outlasts the confirm window.
    pub fn for_confirm_timeout(confirm_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: confirm_timeout + ROLLBACK_GRACE,
            ..Default::default()
        }
    }

    /// Calculate the delay before the given retry (attempt numbers start
    /// at 1; the delay precedes attempt `attempt + 1`).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64()
            * self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Whether the backoff respects the device's rollback window.
    pub fn respects_confirm_timeout(&self, confirm_timeout: Duration) -> bool {
        self.base_delay > confirm_timeout
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}
