//! Wall-clock abstraction used for expiry checks.
//!
//! Expiry timestamps come from the value provider (usually derived from a
//! server response), so freshness is judged against wall-clock time rather
//! than a monotonic instant.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Clock trait for abstracting time operations
///
/// Allows tests to control freshness decisions without real delays.
pub trait Clock: Send + Sync + 'static {
    /// Get current wall-clock time
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Implement Clock for Arc<T> where T: Clock for convenient cloning
impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Mock clock for deterministic testing
///
/// Time only moves when the test advances it. Clones share the same
/// underlying time, so a clone handed to a cache can be driven from the test.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: DateTime<Utc>,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current time
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Create a new mock clock with a specific start time
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { start, elapsed: Arc::new(Mutex::new(Duration::zero())) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: std::time::Duration) {
        let step = Duration::from_std(duration).unwrap_or(Duration::MAX);
        let mut elapsed = self.elapsed.lock();
        *elapsed = elapsed.checked_add(&step).unwrap_or(Duration::MAX);
    }

    /// Advance the mock clock by milliseconds (convenience method)
    pub fn advance_millis(&self, millis: u64) {
        self.advance(std::time::Duration::from_millis(millis));
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        self.start.checked_add_signed(self.elapsed()).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
