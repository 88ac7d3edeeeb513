//! Backoff policies for the retry interceptor.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

/// Wait strategy between two retry attempts.
///
/// The configured value is a template: every retried call works on its own
/// [`RetryBackoff::fresh`] copy, so concurrent calls never share timers or
/// counters.
#[derive(Debug, Clone)]
pub enum RetryBackoff {
    /// Exponentially growing, randomized intervals.
    Exponential(ExponentialBackoff),
    /// The same interval every time.
    Constant(Duration),
    /// Never retry.
    Stop,
    /// Retry immediately.
    Zero,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryBackoff {
    /// Exponential backoff with the `backoff` crate defaults
    /// (500ms initial interval, x1.5 multiplier, 60s cap).
    #[must_use]
    pub fn exponential() -> Self {
        Self::Exponential(ExponentialBackoff::default())
    }

    /// Deterministic exponential backoff without jitter or elapsed-time cap.
    #[must_use]
    pub fn exponential_with(initial: Duration, multiplier: f64, max_interval: Duration) -> Self {
        Self::Exponential(
            ExponentialBackoffBuilder::new()
                .with_initial_interval(initial)
                .with_multiplier(multiplier)
                .with_max_interval(max_interval)
                .with_randomization_factor(0.0)
                .with_max_elapsed_time(None)
                .build(),
        )
    }

    /// Constant backoff.
    #[must_use]
    pub const fn constant(interval: Duration) -> Self {
        Self::Constant(interval)
    }

    /// A reset copy of this policy.
    #[must_use]
    pub fn fresh(&self) -> Self {
        let mut backoff = self.clone();
        backoff.reset();
        backoff
    }

    /// Bound this policy to at most `max_retries` intervals.
    #[must_use]
    pub fn with_max_retries(self, max_retries: u32) -> MaxRetries {
        MaxRetries {
            inner: self,
            max_retries,
            retries: 0,
        }
    }
}

impl Backoff for RetryBackoff {
    fn reset(&mut self) {
        if let Self::Exponential(inner) = self {
            inner.reset();
        }
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        match self {
            Self::Exponential(inner) => inner.next_backoff(),
            Self::Constant(interval) => Some(*interval),
            Self::Stop => None,
            Self::Zero => Some(Duration::ZERO),
        }
    }
}

/// A [`RetryBackoff`] that stops after a fixed number of intervals.
#[derive(Debug, Clone)]
pub struct MaxRetries {
    inner: RetryBackoff,
    max_retries: u32,
    retries: u32,
}

impl MaxRetries {
    /// Intervals handed out so far.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }
}

impl Backoff for MaxRetries {
    fn reset(&mut self) {
        self.retries = 0;
        self.inner.reset();
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries >= self.max_retries {
            return None;
        }
        self.retries += 1;
        self.inner.next_backoff()
    }
}
