//! Reconnect delay bookkeeping: base delay, backoff, jitter and recovery.
//!
//! The strategy is either "good" (events are flowing, since some instant) or
//! "bad". Asking for a delay means the caller is about to retry, so it moves
//! the strategy to "bad". The consecutive-failure counter only resets once the
//! connection has stayed good for the configured reset interval, or when the
//! server supplies a new base delay.

use std::{fmt, time::{Duration, Instant}};

use rand::RngExt;

/// Turns the base delay and the number of consecutive retries into a delay.
pub trait Backoff: fmt::Debug + Send + Sync {
    /// Delay for the `retry_count`-th consecutive retry (starting at 0).
    fn delay(&self, base_delay: Duration, retry_count: u32) -> Duration;
}

/// Randomises a computed delay.
///
/// Implementations must never return more than `delay`.
pub trait Jitter: fmt::Debug + Send + Sync {
    /// Apply jitter to `delay`.
    fn apply(&self, delay: Duration) -> Duration;
}

/// `base * 2^retry_count`, capped at `max_delay`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExponentialBackoff {
    max_delay: Duration,
}

impl ExponentialBackoff {
    /// Create an exponential backoff that never exceeds `max_delay`.
    pub fn new(max_delay: Duration) -> Self {
        Self { max_delay }
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, base_delay: Duration, retry_count: u32) -> Duration {
        base_delay
            .saturating_mul(2u32.saturating_pow(retry_count))
            .min(self.max_delay)
    }
}

/// Subtracts a random amount of up to `ratio * delay`, truncated to whole
/// milliseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatioJitter {
    ratio: f64,
}

impl RatioJitter {
    /// Create a jitter removing up to `ratio` (clamped to `0.0..=1.0`) of
    /// each delay.
    pub fn new(ratio: f64) -> Self {
        let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
        Self { ratio }
    }
}

impl Jitter for RatioJitter {
    fn apply(&self, delay: Duration) -> Duration {
        if self.ratio == 0.0 {
            return delay;
        }

        let mut rng = rand::rng();
        let random: f64 = rng.random_range(0.0..1.0);
        let reduction = (random * self.ratio * delay.as_millis() as f64).trunc();
        delay.saturating_sub(Duration::from_millis(reduction as u64))
    }
}

/// Computes how long to wait before each reconnect attempt.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, Instant};
///
/// use hpx_eventsource::retry::{ExponentialBackoff, RetryDelayStrategy};
///
/// let mut strategy = RetryDelayStrategy::new(Duration::from_secs(1))
///     .with_backoff(ExponentialBackoff::new(Duration::from_secs(8)));
/// let now = Instant::now();
///
/// let delays: Vec<_> = (0..5).map(|_| strategy.next_delay(now).as_secs()).collect();
/// assert_eq!(delays, [1, 2, 4, 8, 8]);
/// ```
#[derive(Debug)]
pub struct RetryDelayStrategy {
    base_delay: Duration,
    reset_interval: Option<Duration>,
    backoff: Option<Box<dyn Backoff>>,
    jitter: Option<Box<dyn Jitter>>,
    retry_count: u32,
    good_since: Option<Instant>,
}

impl RetryDelayStrategy {
    /// A strategy that always waits `base_delay`.
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            reset_interval: None,
            backoff: None,
            jitter: None,
            retry_count: 0,
            good_since: None,
        }
    }

    /// Reset the failure counter once the connection has been good for
    /// `interval`.
    #[must_use]
    pub fn with_reset_interval(mut self, interval: Duration) -> Self {
        self.reset_interval = Some(interval);
        self
    }

    /// Grow the delay with consecutive failures.
    #[must_use]
    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Some(Box::new(backoff));
        self
    }

    /// Randomise each computed delay.
    #[must_use]
    pub fn with_jitter(mut self, jitter: impl Jitter + 'static) -> Self {
        self.jitter = Some(Box::new(jitter));
        self
    }

    /// Delay before the next reconnect attempt, counting it as a failure.
    pub fn next_delay(&mut self, now: Instant) -> Duration {
        if let (Some(good_since), Some(reset_interval)) = (self.good_since, self.reset_interval)
            && now.saturating_duration_since(good_since) >= reset_interval
        {
            self.retry_count = 0;
        }
        self.good_since = None;

        let delay = match &self.backoff {
            Some(backoff) => backoff.delay(self.base_delay, self.retry_count),
            None => self.base_delay,
        };
        self.retry_count = self.retry_count.saturating_add(1);

        match &self.jitter {
            Some(jitter) => jitter.apply(delay).min(delay),
            None => delay,
        }
    }

    /// Record that the connection is healthy as of `now`.
    pub fn mark_good(&mut self, now: Instant) {
        self.good_since = Some(now);
    }

    /// Replace the base delay and forget accumulated backoff.
    pub fn set_base_delay(&mut self, base_delay: Duration) {
        self.base_delay = base_delay;
        self.retry_count = 0;
    }

    /// Current base delay.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Consecutive delays handed out since the last reset.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }
}
