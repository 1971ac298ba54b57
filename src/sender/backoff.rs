//! Exponential back-off configuration for transient gateway failures.
//!
//! Transport-level failures (5xx, timeouts, unparseable responses) are
//! retried with exponential back-off: 3 s, 9 s, 27 s by default, after which
//! the batch is handed back to its queue. Structured rejections are not
//! retried through this path; they go through the recovery planner instead.

use std::time::Duration;

/// Configuration for exponential back-off retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,

    /// Initial delay before the first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries (cap for exponential growth).
    pub max_delay: Duration,

    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Default back-off for transient gateway failures.
    ///
    /// - 3 retries with 3 s, 9 s, 27 s delays
    /// - Total max wait: 39 seconds
    pub const TRANSIENT: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_secs(3),
        max_delay: Duration::from_secs(27),
        backoff_multiplier: 3.0,
    };

    /// Creates a new retry configuration.
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Computes the delay for the given retry attempt (0-indexed).
    ///
    /// The delay grows exponentially: `initial_delay * backoff_multiplier^attempt`,
    /// capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }

    /// Returns an iterator over all retry delays.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }

    /// Computes the total maximum wait time for all retries.
    pub fn total_max_wait(&self) -> Duration {
        self.delays().sum()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::TRANSIENT
    }
}
