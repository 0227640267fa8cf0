//! Reconnection strategies
//!
//! When a thread's transport ends (or a connect attempt fails), the
//! connection driver bumps its `tries` counter and asks the strategy how long
//! to wait before trying again. `tries` is owned by the connection and only
//! goes back to zero after a successful open, so strategies are stateless
//! and a single instance can be shared by every connection of a client.
//!
//! # Built-in Strategies
//!
//! - **ExponentialBackoff**: `min(cap, base * 2^tries)`, unbounded by default
//! - **FixedDelay**: Constant delay between attempts
//!
//! # Examples
//!
//! ```rust
//! use threadlink_client::{ExponentialBackoff, ReconnectionStrategy};
//! use std::time::Duration;
//!
//! // 500ms base, 30s cap, retries forever
//! let default = ExponentialBackoff::default();
//! assert_eq!(default.next_delay(1), Some(Duration::from_millis(1000)));
//! assert_eq!(default.next_delay(12), Some(Duration::from_secs(30)));
//! ```

use std::time::Duration;

/// Base delay of the default backoff
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
/// Upper bound of the default backoff
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Trait for reconnection strategies
pub trait ReconnectionStrategy: Send + Sync {
    /// Returns the delay before the next reconnection attempt
    ///
    /// # Arguments
    ///
    /// * `tries` - Consecutive failed or ended attempts since the last
    ///   successful open, already incremented for the attempt being scheduled
    ///   (so the first retry is called with `1`)
    ///
    /// # Returns
    ///
    /// - `Some(duration)`: Wait this long before attempting reconnection
    /// - `None`: Give up; the connection closes for good
    fn next_delay(&self, tries: u32) -> Option<Duration>;
}

/// Exponential backoff reconnection strategy with optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy with unlimited attempts
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts: None,
            jitter: false,
        }
    }

    /// Give up once `tries` exceeds `max_attempts`
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Add up to 25% random jitter on top of each delay
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// The capped delay for `tries`, without jitter
    pub fn base_delay_for(&self, tries: u32) -> Duration {
        let factor = 1u64.checked_shl(tries).unwrap_or(u64::MAX);
        let base_ms = self.base_delay.as_millis() as u64;
        let cap_ms = self.max_delay.as_millis() as u64;
        Duration::from_millis(base_ms.saturating_mul(factor).min(cap_ms))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, tries: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if tries > max {
                return None;
            }
        }

        let delay = self.base_delay_for(tries);

        if self.jitter {
            use rand::Rng;
            let delay_ms = delay.as_millis() as u64;
            let jitter_ms = rand::thread_rng().gen_range(0..=(delay_ms / 4));
            return Some(Duration::from_millis(delay_ms + jitter_ms));
        }

        Some(delay)
    }
}

/// Fixed delay reconnection strategy
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    /// Create a new fixed delay strategy with unlimited attempts
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Give up once `tries` exceeds `max_attempts`
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, tries: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if tries > max {
                return None;
            }
        }
        Some(self.delay)
    }
}
