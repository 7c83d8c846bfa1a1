//! Reconnection Policy
//!
//! Decides how long the supervisor waits between the end of one stream
//! session and the start of the next. The default is a fixed interval with
//! no attempt limit; exponential backoff with jitter is available as an
//! alternative, and tests swap in zero-delay or bounded variants.

use std::time::Duration;

use rand::Rng;

/// Default delay between stream sessions.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Policy consulted after every stream session.
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    /// Delay before the next session, or `None` to stop retrying.
    fn next_delay(&mut self) -> Option<Duration>;

    /// Number of delays handed out so far.
    fn attempt_count(&self) -> u32;

    /// Forget previous attempts.
    fn reset(&mut self);
}

/// Strategy selector for building a policy from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    /// Same delay every time.
    #[default]
    Fixed,
    /// Doubling delay with jitter, capped.
    Exponential,
}

impl RetryStrategy {
    /// Parse strategy from string, falling back to fixed.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "exponential" | "exp" => Self::Exponential,
            _ => Self::Fixed,
        }
    }

    /// Strategy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Exponential => "exponential",
        }
    }
}

/// Configuration for building a retry policy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Which strategy to use.
    pub strategy: RetryStrategy,
    /// Fixed delay, or initial delay for exponential backoff.
    pub delay: Duration,
    /// Cap on the exponential delay.
    pub max_delay: Duration,
    /// Maximum number of retries (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::Fixed,
            delay: DEFAULT_RETRY_DELAY,
            max_delay: Duration::from_secs(320),
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    /// Build the configured policy.
    #[must_use]
    pub fn build(&self) -> Box<dyn RetryPolicy> {
        match self.strategy {
            RetryStrategy::Fixed => Box::new(FixedInterval::new(self.delay, self.max_attempts)),
            RetryStrategy::Exponential => Box::new(ExponentialBackoff::new(
                self.delay,
                self.max_delay,
                2.0,
                0.1,
                self.max_attempts,
            )),
        }
    }
}

// =============================================================================
// Fixed Interval
// =============================================================================

/// Waits the same delay before every retry.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    delay: Duration,
    max_attempts: u32,
    attempt_count: u32,
}

impl Default for FixedInterval {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY, 0)
    }
}

impl FixedInterval {
    /// Create a policy retrying every `delay`, at most `max_attempts` times
    /// (0 = unlimited).
    #[must_use]
    pub const fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
            attempt_count: 0,
        }
    }

    /// Retry immediately, forever.
    #[must_use]
    pub const fn immediate() -> Self {
        Self::new(Duration::ZERO, 0)
    }
}

impl RetryPolicy for FixedInterval {
    fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts > 0 && self.attempt_count >= self.max_attempts {
            return None;
        }
        self.attempt_count = self.attempt_count.saturating_add(1);
        Some(self.delay)
    }

    fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn reset(&mut self) {
        self.attempt_count = 0;
    }
}

// =============================================================================
// Exponential Backoff
// =============================================================================

/// Exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
    max_attempts: u32,
    current_delay: Duration,
    attempt_count: u32,
}

impl ExponentialBackoff {
    /// Create a new backoff policy.
    #[must_use]
    pub const fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter_factor: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor,
            max_attempts,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Apply jitter to a duration.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts > 0 && self.attempt_count >= self.max_attempts {
            return None;
        }

        self.attempt_count = self.attempt_count.saturating_add(1);
        let delay = self.apply_jitter(self.current_delay);

        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.max_delay.as_millis());
        self.current_delay = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));

        Some(delay)
    }

    fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn reset(&mut self) {
        self.current_delay = self.initial_delay;
        self.attempt_count = 0;
    }
}
