//! Retry policy for backend fetches.

use std::time::Duration;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses a strictly increasing delay between retries.
    ///
    /// The delay before retry `n` (0-based) is `step * (n + 1)`.
    Linear {
        /// The delay increment per attempt.
        step: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Linear {
            step: Duration::from_secs(1),
        }
    }
}

impl Backoff {
    /// Calculate the delay preceding a given retry attempt (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Linear { step } => step * (attempt + 1),
        }
    }
}

/// Configuration for the automatic retry mechanism.
///
/// The fetch contract is at-least-once with bounded retries: a failing URL
/// is attempted `max_retries + 1` times in total, and the last error is
/// returned as data rather than raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// The maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// The backoff strategy applied between attempts.
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    /// Retry configuration with linear backoff.
    pub fn linear(max_retries: u32, step: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Linear { step },
        }
    }

    /// Retry configuration with fixed backoff.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    /// Disable retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            backoff: Backoff::default(),
        }
    }

    /// Calculate the delay preceding a given retry attempt (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}
